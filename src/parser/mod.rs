//! Defensive parsing of free-form VLM output.
//!
//! The model is asked for `<action>select(N)</action>` but often answers in
//! prose. [`parse_decision`] walks [`DECISION_RULES`] in order: the first rule
//! that matches contributes only its first match, an invalid value moves on to
//! the next rule, and running out of rules is a [`ParseError::NoDecision`].

mod rules;

pub use rules::{CaptureKind, DecisionRule, RuleOutcome, AFFIRMATIVE_TOKENS, DECISION_RULES};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use rules::{NEGATIVE_LEAD, SCORE_DIGITS};

/// Parser errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty model response")]
    EmptyResponse,
    #[error("No decision found in model response")]
    NoDecision,
    #[error("Option index {0} is outside 0..=2")]
    OutOfRange(u32),
}

/// Index of the chosen card: 0 = left (a), 1 = middle (b), 2 = right (c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Decision(u8);

impl Decision {
    /// Number of options on screen.
    pub const OPTIONS: u32 = 3;

    pub fn new(index: u32) -> Option<Self> {
        (index < Self::OPTIONS).then(|| Self(index as u8))
    }

    /// Map `a`/`b`/`c` (any case) to 0/1/2.
    pub fn from_letter(letter: char) -> Option<Self> {
        let lower = letter.to_ascii_lowercase();
        if !lower.is_ascii_lowercase() {
            return None;
        }
        Self::new(u32::from(lower) - u32::from('a'))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn all() -> impl Iterator<Item = Decision> {
        (0..Self::OPTIONS).filter_map(Self::new)
    }
}

impl TryFrom<u32> for Decision {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ParseError::OutOfRange(value))
    }
}

impl From<Decision> for u32 {
    fn from(d: Decision) -> Self {
        u32::from(d.0)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract the chosen option from model text.
pub fn parse_decision(text: &str) -> Result<Decision, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    for rule in DECISION_RULES.iter() {
        match rule.apply(text) {
            RuleOutcome::Decided(decision) => {
                tracing::debug!("Decision {} from rule {}", decision, rule.name);
                return Ok(decision);
            }
            RuleOutcome::Rejected(raw) => {
                tracing::debug!("Rule {} matched out-of-range value {:?}", rule.name, raw);
            }
            RuleOutcome::NoMatch => {}
        }
    }

    Err(ParseError::NoDecision)
}

/// Whether a verification answer is affirmative.
///
/// An answer opening with a negation ("No, ...", "不是", "否") is negative.
/// Otherwise any affirmative keyword counts.
pub fn classify_success(text: &str) -> bool {
    if NEGATIVE_LEAD.is_match(text) {
        return false;
    }
    let lowered = text.to_lowercase();
    AFFIRMATIVE_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Score from a final-screen answer: the first digit run only.
///
/// "第10轮，得分80" therefore reads as 10.
pub fn extract_score(text: &str) -> Option<u32> {
    SCORE_DIGITS.find(text).and_then(|m| m.as_str().parse().ok())
}
