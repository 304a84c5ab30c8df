//! Ordered extraction rules for turning free-form model text into a decision.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Decision;

/// How a rule's capture group maps onto the decision domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// A decimal index, used as is.
    Index,
    /// An option letter, mapped by its position in the alphabet.
    Letter,
}

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    NoMatch,
    /// The rule matched, but its first match is not a valid option.
    Rejected(String),
    Decided(Decision),
}

/// One pattern of the decision table.
#[derive(Debug)]
pub struct DecisionRule {
    pub name: &'static str,
    pattern: Regex,
    capture: CaptureKind,
}

impl DecisionRule {
    fn new(name: &'static str, pattern: &str, capture: CaptureKind) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("decision rule patterns are static and valid"),
            capture,
        }
    }

    /// Capture group of the first match, if the rule matches at all.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Apply the rule to `text`; only the first match counts.
    pub fn apply(&self, text: &str) -> RuleOutcome {
        let Some(raw) = self.first_match(text) else {
            return RuleOutcome::NoMatch;
        };

        let decision = match self.capture {
            CaptureKind::Index => raw.parse::<u32>().ok().and_then(Decision::new),
            CaptureKind::Letter => raw.chars().next().and_then(Decision::from_letter),
        };

        match decision {
            Some(d) => RuleOutcome::Decided(d),
            None => RuleOutcome::Rejected(raw.to_string()),
        }
    }
}

/// Decision rules, most explicit first.
pub static DECISION_RULES: Lazy<Vec<DecisionRule>> = Lazy::new(|| {
    use CaptureKind::{Index, Letter};
    vec![
        DecisionRule::new(
            "action_tag",
            r"(?i)<action>\s*select\(\s*([0-9]+)\s*\)\s*</action>",
            Index,
        ),
        DecisionRule::new("selected_index_zh", r"选择的?索引\s*[:：]\s*([0-9]+)", Index),
        DecisionRule::new("index_zh", r"索引\s*[:：]\s*([0-9]+)", Index),
        DecisionRule::new("index_en", r"(?i)\bindex\s*[:：]\s*([0-9]+)", Index),
        DecisionRule::new("select_call", r"(?i)select\(\s*([0-9]+)\s*\)", Index),
        DecisionRule::new("choose_zh", r"选择\s*([0-9]+)", Index),
        DecisionRule::new("ordinal_zh", r"第\s*([0-9]+)\s*个", Index),
        DecisionRule::new("answer_number", r"(?i)\banswer\s*[:：]\s*([0-9]+)", Index),
        DecisionRule::new("option_letter_zh", r"(?i)选项\s*([abc])", Letter),
        DecisionRule::new("option_letter_en", r"(?i)\boption\s*([abc])\b", Letter),
        DecisionRule::new("answer_letter", r"(?i)\banswer\s*[:：]\s*([abc])\b", Letter),
    ]
});

/// Tokens whose presence marks a positive verification answer.
pub const AFFIRMATIVE_TOKENS: &[&str] = &["是", "成功", "改变", "yes"];

/// An answer that opens with a negation is negative whatever follows.
pub static NEGATIVE_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:no\b|not\b|none\b|否|不)")
        .expect("negation pattern is static and valid")
});

/// First contiguous digit run.
pub static SCORE_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("score pattern is static and valid"));
