//! Where a round's choice comes from: the model, or a seeded coin.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::adb::Screenshot;
use crate::parser::{parse_decision, Decision, ParseError};
use crate::ports::PerceptionPort;

/// Produces the option to tap for a question screenshot.
#[async_trait]
pub trait DecisionSource: Send {
    async fn decide(&mut self, screenshot: &Screenshot) -> Result<Decision, ParseError>;

    fn name(&self) -> String;
}

/// Uniformly random choice, for collecting unbiased training screenshots.
pub struct RandomDecision {
    rng: StdRng,
}

impl RandomDecision {
    /// Reproducible sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl DecisionSource for RandomDecision {
    async fn decide(&mut self, _screenshot: &Screenshot) -> Result<Decision, ParseError> {
        let index = self.rng.gen_range(0..Decision::OPTIONS);
        Decision::try_from(index)
    }

    fn name(&self) -> String {
        "random".to_string()
    }
}

/// Ask the VLM with the rule-explanation prompt and parse its answer.
pub struct ModelDecision {
    perception: Arc<dyn PerceptionPort>,
    prompt: String,
}

impl ModelDecision {
    pub fn new(perception: Arc<dyn PerceptionPort>, prompt: impl Into<String>) -> Self {
        Self {
            perception,
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl DecisionSource for ModelDecision {
    async fn decide(&mut self, screenshot: &Screenshot) -> Result<Decision, ParseError> {
        tracing::info!("VLM inference...");
        let response = self.perception.query(screenshot, &self.prompt).await;
        tracing::debug!("VLM output:\n{}", response);
        parse_decision(&response)
    }

    fn name(&self) -> String {
        format!("model({})", self.perception.describe())
    }
}
