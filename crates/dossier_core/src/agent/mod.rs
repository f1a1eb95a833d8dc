//! External text-parsing and matching service contracts.
//!
//! # Responsibility
//! - Define the `ParseService` / `MatchService` seams the core calls into.
//! - Own the wire shapes of both services.
//!
//! # Invariants
//! - Service failures are reported as `AgentError` values; callers treat any
//!   error exactly like an empty answer.
//! - Both the wrapped (`{items}` / `{matches}`) and bare-array response
//!   forms are accepted.

use crate::model::material::Material;
use crate::model::requirement::{Candidate, RequirementItem};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod http;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// No endpoint configured for this service.
    NotConfigured(&'static str),
    /// Connection, timeout or other transport-level failure.
    Transport(String),
    /// Service answered with a non-success HTTP status.
    Status(u16),
    /// Response body did not match the contract.
    Decode(String),
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured(service) => write!(f, "{service} service is not configured"),
            Self::Transport(message) => write!(f, "agent transport error: {message}"),
            Self::Status(code) => write!(f, "agent service returned status {code}"),
            Self::Decode(message) => write!(f, "agent response decode error: {message}"),
        }
    }
}

impl Error for AgentError {}

/// Turns free text into structured requirement items.
pub trait ParseService {
    fn parse(&self, text: &str) -> AgentResult<Vec<RequirementItem>>;
}

/// Suggests ranked materials for each requirement item.
pub trait MatchService {
    fn match_items(
        &self,
        items: &[RequirementItem],
        materials: &[Material],
    ) -> AgentResult<MatchResponse>;
}

#[derive(Debug, Serialize)]
pub(crate) struct ParseRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ParseResponseBody {
    Wrapped {
        #[serde(default)]
        items: Vec<RequirementItem>,
    },
    Bare(Vec<RequirementItem>),
}

impl ParseResponseBody {
    pub(crate) fn into_items(self) -> Vec<RequirementItem> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MatchRequest<'a> {
    pub items: &'a [RequirementItem],
    pub materials: Vec<MatchMaterial<'a>>,
}

/// Material projection sent to the matching service.
#[derive(Debug, Serialize)]
pub(crate) struct MatchMaterial<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub category: Option<&'a str>,
    pub tags: &'a [String],
}

impl<'a> From<&'a Material> for MatchMaterial<'a> {
    fn from(material: &'a Material) -> Self {
        Self {
            id: &material.id,
            filename: &material.filename,
            category: material.category.as_deref(),
            tags: &material.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MatchResponseBody {
    Wrapped {
        #[serde(default)]
        matches: Vec<MatchEntry>,
    },
    Bare(Vec<MatchEntry>),
}

impl From<MatchResponseBody> for MatchResponse {
    fn from(value: MatchResponseBody) -> Self {
        match value {
            MatchResponseBody::Wrapped { matches } | MatchResponseBody::Bare(matches) => {
                Self { matches }
            }
        }
    }
}

/// Ranked suggestions for one requirement item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchEntry {
    #[serde(default)]
    pub item_label: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Matching service answer, aligned by index with the request items.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchResponse {
    #[serde(default)]
    pub matches: Vec<MatchEntry>,
}

impl MatchResponse {
    /// Finds the entry for item `index`, falling back to a label lookup.
    pub fn entry_for(&self, index: usize, label: &str) -> Option<&MatchEntry> {
        self.matches.get(index).or_else(|| {
            self.matches
                .iter()
                .find(|entry| entry.item_label.as_deref() == Some(label))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MatchEntry, MatchResponse, MatchResponseBody, ParseResponseBody};
    use crate::model::requirement::Candidate;

    #[test]
    fn parse_body_accepts_wrapped_and_bare_forms() {
        let wrapped: ParseResponseBody =
            serde_json::from_str(r#"{"items":[{"label":"报名表","category":"personal"}]}"#)
                .unwrap();
        let bare: ParseResponseBody =
            serde_json::from_str(r#"[{"label":"推荐信","category":"recommendation"}]"#).unwrap();
        assert_eq!(wrapped.into_items()[0].label, "报名表");
        assert_eq!(bare.into_items()[0].category, "recommendation");
    }

    #[test]
    fn match_body_ignores_extra_candidate_fields() {
        let body: MatchResponseBody = serde_json::from_str(
            r#"{"matches":[{"item_label":"本科成绩单","candidates":[{"id":"m1","score":80,"reason":"category"}]}]}"#,
        )
        .unwrap();
        let response = MatchResponse::from(body);
        assert_eq!(response.matches[0].candidates, vec![Candidate::new("m1", 80.0)]);
    }

    #[test]
    fn entry_for_prefers_index_then_label() {
        let response = MatchResponse {
            matches: vec![MatchEntry {
                item_label: Some("推荐信".to_string()),
                candidates: vec![Candidate::new("m9", 1.0)],
            }],
        };
        assert!(response.entry_for(0, "anything").is_some());
        assert!(response.entry_for(3, "推荐信").is_some());
        assert!(response.entry_for(3, "论文").is_none());
    }
}
