//! Ephemeral requirement/matching records.
//!
//! Nothing here is persisted: requirement items live for one arrange run and
//! candidates live until their placeholder is resolved.

use crate::model::material::MaterialId;
use serde::{Deserialize, Serialize};

/// Coarse category used for unclassified requirement items.
pub const OTHER_CATEGORY: &str = "other";

/// One structured requirement extracted from admissions text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementItem {
    pub label: String,
    #[serde(default)]
    pub category: String,
}

impl RequirementItem {
    pub fn new(label: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            category: category.into(),
        }
    }

    /// Whether the category carries no usable classification.
    pub fn is_unclassified(&self) -> bool {
        let category = self.category.trim();
        category.is_empty() || category.eq_ignore_ascii_case(OTHER_CATEGORY)
    }
}

/// Ranked material suggestion attached to a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "id")]
    pub material_id: MaterialId,
    #[serde(default)]
    pub score: f64,
}

impl Candidate {
    pub fn new(material_id: impl Into<MaterialId>, score: f64) -> Self {
        Self {
            material_id: material_id.into(),
            score,
        }
    }
}
