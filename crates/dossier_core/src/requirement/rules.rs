//! Keyword rules and text helpers for requirement parsing.
//!
//! # Responsibility
//! - Classify requirement text into coarse categories via ordered rules.
//! - Segment numbered admissions text and strip ordinal markers.
//! - Tokenize labels for lexical matching.
//!
//! # Invariants
//! - Rules are tested in table order; the first match wins.
//! - Every produced item has a non-empty label.

use crate::model::requirement::{RequirementItem, OTHER_CATEGORY};
use once_cell::sync::Lazy;
use regex::Regex;

struct KeywordRule {
    category: &'static str,
    label: &'static str,
    pattern: Regex,
}

impl KeywordRule {
    fn item(&self) -> RequirementItem {
        RequirementItem::new(self.label, self.category)
    }
}

fn rule(category: &'static str, label: &'static str, pattern: &str) -> KeywordRule {
    KeywordRule {
        category,
        label,
        pattern: Regex::new(&format!("(?i){pattern}")).expect("valid keyword rule regex"),
    }
}

// english and ranking sit before transcript: "英语六级成绩单" is a language
// certificate and "成绩排名" is a ranking proof, both mention 成绩.
static RULES: Lazy<Vec<KeywordRule>> = Lazy::new(|| {
    vec![
        rule("personal", "报名表/申请表", "报名表|报名|申请表"),
        rule(
            "english",
            "外语水平证明",
            "外语|英语|托福|雅思|四级|六级|cet|toefl|ielts",
        ),
        rule("transcript", "成绩排名证明", "总评成绩|排名"),
        rule("transcript", "本科成绩单", "成绩单|transcript|成绩"),
        rule("paper", "学术论文/出版物", "论文|paper|publication"),
        rule("recommendation", "推荐信", "推荐信|recommend"),
        rule("certificate", "证书/获奖证明", "证书|获奖|award"),
        rule("identity", "身份证明", "身份证|id card|身份证明"),
        rule("photo", "证件照", "照片|证件照|photo"),
    ]
});

static NUMBERED_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[\s;；，。])([（(]?\d+[）)]?[^\n;；，。)]+)")
        .expect("valid numbered segment regex")
});
static LEADING_ORDINAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s\x{3000}]*[（(]?\d+[）)]?[\s.．、)）]*").expect("valid ordinal regex")
});
static PART_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;；，。]").expect("valid separator regex"));
static MATERIALS_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)材料|materials").expect("valid materials hint regex"));
static TOKEN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\x{4e00}-\x{9fff}]+").expect("valid token split regex"));

/// Returns the first rule item matching `text`, if any.
pub fn classify(text: &str) -> Option<RequirementItem> {
    RULES
        .iter()
        .find(|rule| rule.pattern.is_match(text))
        .map(KeywordRule::item)
}

/// Parses admissions text with the local keyword rules only.
///
/// Numbered text is segmented first and each segment classified on its own;
/// unmatched segments become `other` items labelled with the segment text.
/// Otherwise every rule matching the whole text contributes one item.
pub fn parse_with_rules(text: &str) -> Vec<RequirementItem> {
    let segments = numbered_segments(text);
    if !segments.is_empty() {
        return segments
            .into_iter()
            .filter_map(classify_or_literal)
            .collect();
    }

    let items = RULES
        .iter()
        .filter(|rule| rule.pattern.is_match(text))
        .map(KeywordRule::item)
        .collect::<Vec<_>>();
    if !items.is_empty() || !MATERIALS_HINT_RE.is_match(text) {
        return items;
    }

    PART_SEPARATOR_RE
        .split(text)
        .filter_map(classify_or_literal)
        .collect()
}

/// Extracts numbered/bracketed clauses such as `1. 报名表` or `（2）推荐信`.
pub fn numbered_segments(text: &str) -> Vec<&str> {
    NUMBERED_SEGMENT_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Removes a leading ordinal marker (`(1) `, `3、`, `2. `, `（4）`).
pub fn strip_ordinal(label: &str) -> &str {
    match LEADING_ORDINAL_RE.find(label) {
        Some(marker) => label[marker.end()..].trim(),
        None => label.trim(),
    }
}

/// Lower-cases and splits on non-alphanumeric, non-CJK boundaries,
/// dropping single-character tokens.
pub fn tokenize(label: &str) -> Vec<String> {
    let lowered = label.to_lowercase();
    TOKEN_SPLIT_RE
        .split(&lowered)
        .filter(|token| token.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

fn classify_or_literal(segment: &str) -> Option<RequirementItem> {
    if let Some(item) = classify(segment) {
        return Some(item);
    }
    let label = strip_ordinal(segment);
    if label.is_empty() {
        return None;
    }
    Some(RequirementItem::new(label, OTHER_CATEGORY))
}
