//! Requirement-to-material matching.
//!
//! # Responsibility
//! - Score every material against one requirement item.
//! - Decide, per item, between auto-placement and a placeholder with
//!   ranked candidates.
//!
//! # Invariants
//! - External suggestions are only trusted when the suggested material is
//!   present in the store.
//! - Candidate lists attached to placeholders only reference known materials.
//! - Ranking is stable: equal scores keep store order.

use crate::agent::MatchResponse;
use crate::config::CoreConfig;
use crate::model::material::{Material, MaterialId, MaterialStore};
use crate::model::requirement::{Candidate, RequirementItem, OTHER_CATEGORY};
use crate::requirement::rules::{parse_with_rules, strip_ordinal, tokenize};

const EXACT_CATEGORY_SCORE: u32 = 5;
const PARTIAL_CATEGORY_SCORE: u32 = 2;
const FILENAME_TOKEN_SCORE: u32 = 3;
const TAG_TOKEN_SCORE: u32 = 2;
const FILENAME_PREFIX_SCORE: u32 = 2;

/// Requirement item prepared for scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub label: String,
    pub category: String,
    pub tokens: Vec<String>,
}

impl NormalizedItem {
    /// Display label for a placeholder: the label, else the category.
    pub fn placeholder_label(&self) -> &str {
        if !self.label.is_empty() {
            &self.label
        } else if !self.category.is_empty() {
            &self.category
        } else {
            OTHER_CATEGORY
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementSource {
    External,
    Local,
}

/// Matching decision for one requirement item.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Append a resolved item for `material_id`.
    Place {
        material_id: MaterialId,
        source: PlacementSource,
        score: f64,
    },
    /// Append a placeholder labelled `label` with review candidates.
    Placeholder {
        label: String,
        candidates: Vec<Candidate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    pub candidate_limit: usize,
    pub min_auto_place_score: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            candidate_limit: 3,
            min_auto_place_score: 1,
        }
    }
}

impl From<&CoreConfig> for MatchOptions {
    fn from(config: &CoreConfig) -> Self {
        Self {
            candidate_limit: config.candidate_limit,
            min_auto_place_score: config.min_auto_place_score,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    options: MatchOptions,
}

impl MatchingEngine {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Strips ordinals, recovers unclassified categories and tokenizes.
    pub fn normalize(&self, item: &RequirementItem) -> NormalizedItem {
        let mut label = strip_ordinal(&item.label).to_string();
        let mut category = item.category.trim().to_lowercase();

        if item.is_unclassified() {
            if let Some(inferred) = parse_with_rules(&label).into_iter().next() {
                if !inferred.category.is_empty() {
                    category = inferred.category;
                }
                if !inferred.label.is_empty() {
                    label = inferred.label;
                }
            }
        }

        let tokens = tokenize(&label);
        NormalizedItem {
            label,
            category,
            tokens,
        }
    }

    pub fn score(&self, item: &NormalizedItem, material: &Material) -> u32 {
        let material_category = material
            .category
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let filename = material.filename.to_lowercase();
        let tags = material
            .tags
            .iter()
            .map(|tag| tag.to_lowercase())
            .collect::<Vec<_>>();

        let mut score = 0;
        if !item.category.is_empty() && !material_category.is_empty() {
            if material_category == item.category {
                score += EXACT_CATEGORY_SCORE;
            } else if material_category.contains(&item.category) {
                score += PARTIAL_CATEGORY_SCORE;
            }
        }
        for token in &item.tokens {
            if filename.contains(token.as_str()) {
                score += FILENAME_TOKEN_SCORE;
            }
            if tags.iter().any(|tag| tag.contains(token.as_str())) {
                score += TAG_TOKEN_SCORE;
            }
        }
        if let Some(first) = item.tokens.first() {
            if filename.starts_with(first.as_str()) {
                score += FILENAME_PREFIX_SCORE;
            }
        }
        score
    }

    /// Scores every material, highest first.
    pub fn rank<'a>(
        &self,
        item: &NormalizedItem,
        store: &'a MaterialStore,
    ) -> Vec<(&'a Material, u32)> {
        let mut ranked = store
            .iter()
            .map(|material| (material, self.score(item, material)))
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Decides the placement for item `index` of a parsed requirement list.
    pub fn place(
        &self,
        index: usize,
        item: &RequirementItem,
        store: &MaterialStore,
        external: Option<&MatchResponse>,
    ) -> Placement {
        let entry = external.and_then(|response| response.entry_for(index, &item.label));
        if let Some(top) = entry.and_then(|entry| entry.candidates.first()) {
            if store.contains(&top.material_id) {
                return Placement::Place {
                    material_id: top.material_id.clone(),
                    source: PlacementSource::External,
                    score: top.score,
                };
            }
        }

        let normalized = self.normalize(item);
        let ranked = self.rank(&normalized, store);
        if let Some((best, score)) = ranked.first() {
            if *score > 0 && *score >= self.options.min_auto_place_score {
                return Placement::Place {
                    material_id: best.id.clone(),
                    source: PlacementSource::Local,
                    score: f64::from(*score),
                };
            }
        }

        let external_candidates = entry
            .map(|entry| {
                entry
                    .candidates
                    .iter()
                    .filter(|candidate| store.contains(&candidate.material_id))
                    .take(self.options.candidate_limit)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let candidates = if external_candidates.is_empty() {
            ranked
                .iter()
                .filter(|(_, score)| *score > 0)
                .take(self.options.candidate_limit)
                .map(|(material, score)| Candidate::new(material.id.clone(), f64::from(*score)))
                .collect()
        } else {
            external_candidates
        };

        Placement::Placeholder {
            label: normalized.placeholder_label().to_string(),
            candidates,
        }
    }

    /// Placements for every item, in input order.
    pub fn plan(
        &self,
        items: &[RequirementItem],
        store: &MaterialStore,
        external: Option<&MatchResponse>,
    ) -> Vec<Placement> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.place(index, item, store, external))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{MatchOptions, MatchingEngine, Placement, PlacementSource};
    use crate::agent::{MatchEntry, MatchResponse};
    use crate::model::material::{Material, MaterialStore};
    use crate::model::requirement::{Candidate, RequirementItem};

    fn store() -> MaterialStore {
        MaterialStore::from_materials(vec![
            Material::new("m-transcript", "scan_001.pdf", Some("transcript")),
            Material::new("m-file", "英文版_成绩单.pdf", None),
            Material::new("m-photo", "photo_blue.jpg", Some("photo")).with_tags(["证件照"]),
        ])
    }

    #[test]
    fn exact_category_outscores_single_filename_token() {
        let engine = MatchingEngine::default();
        let item = engine.normalize(&RequirementItem::new("成绩单", "transcript"));
        let store = store();
        let category_hit = engine.score(&item, store.get("m-transcript").unwrap());
        let token_hit = engine.score(&item, store.get("m-file").unwrap());
        assert_eq!(category_hit, 5);
        assert_eq!(token_hit, 3);
    }

    #[test]
    fn normalize_recovers_category_for_unclassified_items() {
        let engine = MatchingEngine::default();
        let item = engine.normalize(&RequirementItem::new("(3) 两寸证件照", "other"));
        assert_eq!(item.category, "photo");
        assert_eq!(item.label, "证件照");
        assert_eq!(item.tokens, vec!["证件照".to_string()]);
    }

    #[test]
    fn external_top_candidate_wins_when_known() {
        let engine = MatchingEngine::default();
        let external = MatchResponse {
            matches: vec![MatchEntry {
                item_label: None,
                candidates: vec![Candidate::new("m-photo", 0.9)],
            }],
        };
        let placement = engine.place(
            0,
            &RequirementItem::new("本科成绩单", "transcript"),
            &store(),
            Some(&external),
        );
        assert_eq!(
            placement,
            Placement::Place {
                material_id: "m-photo".to_string(),
                source: PlacementSource::External,
                score: 0.9,
            }
        );
    }

    #[test]
    fn unknown_external_candidate_falls_back_to_local_best() {
        let engine = MatchingEngine::default();
        let external = MatchResponse {
            matches: vec![MatchEntry {
                item_label: None,
                candidates: vec![Candidate::new("deleted", 0.9)],
            }],
        };
        let placement = engine.place(
            0,
            &RequirementItem::new("本科成绩单", "transcript"),
            &store(),
            Some(&external),
        );
        assert!(matches!(
            placement,
            Placement::Place {
                ref material_id,
                source: PlacementSource::Local,
                ..
            } if material_id == "m-transcript"
        ));
    }

    #[test]
    fn zero_scores_create_placeholder_with_known_external_candidates() {
        let engine = MatchingEngine::default();
        let external = MatchResponse {
            matches: vec![MatchEntry {
                item_label: Some("推荐信".to_string()),
                candidates: vec![Candidate::new("ghost", 0.8), Candidate::new("ghost-2", 0.4)],
            }],
        };
        let placement = engine.place(
            0,
            &RequirementItem::new("推荐信", "recommendation"),
            &store(),
            Some(&external),
        );
        assert_eq!(
            placement,
            Placement::Placeholder {
                label: "推荐信".to_string(),
                candidates: Vec::new(),
            }
        );
    }

    #[test]
    fn threshold_turns_weak_local_match_into_candidates() {
        let engine = MatchingEngine::new(MatchOptions {
            candidate_limit: 1,
            min_auto_place_score: 10,
        });
        let placement = engine.place(
            0,
            &RequirementItem::new("本科成绩单", "transcript"),
            &store(),
            None,
        );
        match placement {
            Placement::Placeholder { label, candidates } => {
                assert_eq!(label, "本科成绩单");
                assert_eq!(candidates, vec![Candidate::new("m-transcript", 5.0)]);
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    #[test]
    fn plan_keeps_input_order() {
        let engine = MatchingEngine::default();
        let placements = engine.plan(
            &[
                RequirementItem::new("证件照", "photo"),
                RequirementItem::new("推荐信", "recommendation"),
            ],
            &store(),
            None,
        );
        assert!(matches!(placements[0], Placement::Place { .. }));
        assert!(matches!(placements[1], Placement::Placeholder { .. }));
    }
}
