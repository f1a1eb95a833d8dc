//! Requirement text parsing with an optional external service.

use crate::agent::ParseService;
use crate::model::requirement::RequirementItem;
use crate::requirement::rules::{parse_with_rules, strip_ordinal};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Parsing failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Input was empty or whitespace only.
    EmptyInput,
    /// Neither the service nor the local rules produced any item.
    NothingRecognized,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "requirement text is empty"),
            Self::NothingRecognized => write!(f, "no requirement items recognized"),
        }
    }
}

impl Error for ParseError {}

/// Which path produced the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    Service,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequirements {
    pub items: Vec<RequirementItem>,
    pub source: ParseSource,
}

/// Turns admissions text into requirement items.
///
/// The external service is asked first; a failure or an empty answer falls
/// back to the local keyword rules.
#[derive(Default)]
pub struct RequirementParser {
    service: Option<Box<dyn ParseService + Send>>,
}

impl RequirementParser {
    /// Parser that only uses the local rules.
    pub fn rules_only() -> Self {
        Self::default()
    }

    pub fn with_service(service: Box<dyn ParseService + Send>) -> Self {
        Self {
            service: Some(service),
        }
    }

    pub fn parse(&self, text: &str) -> Result<ParsedRequirements, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        if let Some(items) = self.parse_with_service(text) {
            return Ok(ParsedRequirements {
                items,
                source: ParseSource::Service,
            });
        }

        let items = parse_with_rules(text);
        if items.is_empty() {
            info!("event=requirement_parse module=requirement status=empty source=rules");
            return Err(ParseError::NothingRecognized);
        }
        info!(
            "event=requirement_parse module=requirement status=ok source=rules items={}",
            items.len()
        );
        Ok(ParsedRequirements {
            items,
            source: ParseSource::Rules,
        })
    }

    fn parse_with_service(&self, text: &str) -> Option<Vec<RequirementItem>> {
        let service = self.service.as_ref()?;
        match service.parse(text) {
            Ok(items) => {
                let items = normalize_items(items);
                if items.is_empty() {
                    info!("event=requirement_parse module=requirement status=empty source=service");
                    return None;
                }
                info!(
                    "event=requirement_parse module=requirement status=ok source=service items={}",
                    items.len()
                );
                Some(items)
            }
            Err(err) => {
                warn!(
                    "event=requirement_parse module=requirement status=fallback source=service error={err}"
                );
                None
            }
        }
    }
}

fn normalize_items(items: Vec<RequirementItem>) -> Vec<RequirementItem> {
    items
        .into_iter()
        .filter_map(|item| {
            let label = strip_ordinal(&item.label).to_string();
            if label.is_empty() && item.category.trim().is_empty() {
                return None;
            }
            Some(RequirementItem::new(label, item.category.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ParseError, ParseSource, RequirementParser};
    use crate::agent::{AgentError, AgentResult, ParseService};
    use crate::model::requirement::RequirementItem;

    struct FixedService(AgentResult<Vec<RequirementItem>>);

    impl ParseService for FixedService {
        fn parse(&self, _text: &str) -> AgentResult<Vec<RequirementItem>> {
            self.0.clone()
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let parser = RequirementParser::rules_only();
        assert_eq!(parser.parse("  \n ").unwrap_err(), ParseError::EmptyInput);
    }

    #[test]
    fn service_items_win_and_are_normalized() {
        let parser = RequirementParser::with_service(Box::new(FixedService(Ok(vec![
            RequirementItem::new("(1) 个人陈述", "statement"),
            RequirementItem::new("  ", ""),
        ]))));
        let parsed = parser.parse("随便什么文本").unwrap();
        assert_eq!(parsed.source, ParseSource::Service);
        assert_eq!(parsed.items, vec![RequirementItem::new("个人陈述", "statement")]);
    }

    #[test]
    fn service_failure_falls_back_to_rules() {
        let parser = RequirementParser::with_service(Box::new(FixedService(Err(
            AgentError::Status(503),
        ))));
        let parsed = parser.parse("1. 推荐信\n2. 证件照").unwrap();
        assert_eq!(parsed.source, ParseSource::Rules);
        assert_eq!(parsed.items.len(), 2);
    }

    #[test]
    fn empty_service_answer_falls_back_to_rules() {
        let parser = RequirementParser::with_service(Box::new(FixedService(Ok(Vec::new()))));
        let parsed = parser.parse("需要雅思成绩").unwrap();
        assert_eq!(parsed.source, ParseSource::Rules);
        assert_eq!(parsed.items[0].category, "english");
    }

    #[test]
    fn unrecognized_text_reports_nothing_recognized() {
        let parser = RequirementParser::rules_only();
        assert_eq!(
            parser.parse("see you soon").unwrap_err(),
            ParseError::NothingRecognized
        );
    }
}
