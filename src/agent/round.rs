//! One game round: capture, decide, act, verify, advance.

use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;

use super::decision::DecisionSource;
use super::episode::RoundRunner;
use super::records::{FinalState, RoundRecord};
use crate::adb::{DeviceError, Screenshot};
use crate::config::{Layout, Position, ResetStep, Timings};
use crate::parser::{classify_success, extract_score, ParseError};
use crate::ports::{ActuationPort, PerceptionPort};
use crate::storage::{DeviceStore, EvidenceTag, StorageError, FINAL_ROUND_INDEX};

/// Card taps allowed per round.
pub const DEFAULT_TAP_ATTEMPTS: u32 = 3;

/// Why a round was abandoned. None of these end the episode.
#[derive(Error, Debug)]
pub enum RoundError {
    #[error("screen capture failed: {0}")]
    Capture(#[source] DeviceError),
    #[error("could not save evidence: {0}")]
    Evidence(#[from] StorageError),
    #[error("no decision: {0}")]
    Decision(#[from] ParseError),
    #[error("card tap not confirmed after {attempts} attempts")]
    TapsExhausted { attempts: u32 },
    #[error("tap on next-round button failed: {0}")]
    Advance(#[source] DeviceError),
}

/// How a card tap is confirmed.
#[derive(Clone)]
pub enum Verification {
    /// Capture the screen and ask the model whether a card changed color.
    ColorChange {
        perception: Arc<dyn PerceptionPort>,
        prompt: String,
    },
    /// Wait a fixed delay and assume the tap landed.
    AssumeSuccess,
}

impl Verification {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorChange { .. } => "color-change",
            Self::AssumeSuccess => "assume-success",
        }
    }
}

/// Reads the score off the final screen.
#[derive(Clone)]
pub struct ScoreProbe {
    pub perception: Arc<dyn PerceptionPort>,
    pub prompt: String,
}

/// Plays rounds on one device.
pub struct RoundController<A: ActuationPort> {
    device: A,
    decisions: Box<dyn DecisionSource>,
    verification: Verification,
    score_probe: Option<ScoreProbe>,
    layout: Layout,
    timings: Timings,
    store: DeviceStore,
    max_tap_attempts: u32,
}

impl<A: ActuationPort> RoundController<A> {
    pub fn new(
        device: A,
        decisions: Box<dyn DecisionSource>,
        verification: Verification,
        layout: Layout,
        timings: Timings,
        store: DeviceStore,
    ) -> Self {
        Self {
            device,
            decisions,
            verification,
            score_probe: None,
            layout,
            timings,
            store,
            max_tap_attempts: DEFAULT_TAP_ATTEMPTS,
        }
    }

    /// Read a final score with the model at the end of each episode.
    pub fn with_score_probe(mut self, probe: ScoreProbe) -> Self {
        self.score_probe = Some(probe);
        self
    }

    pub fn with_max_tap_attempts(mut self, attempts: u32) -> Self {
        self.max_tap_attempts = attempts.max(1);
        self
    }

    pub fn device(&self) -> &A {
        &self.device
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// Reload the game page between episodes.
    pub async fn reset_environment(&mut self) -> Result<(), DeviceError> {
        tracing::info!("Refreshing browser...");
        for step in self.layout.reset.clone() {
            match step {
                ResetStep::Back => self.device.press_back(self.timings.reset_step_settle).await?,
                ResetStep::Tap(at) => self.device.tap(at, self.timings.reset_step_settle).await?,
            }
        }
        sleep(self.timings.reset_settle).await;
        tracing::info!("Browser refreshed");
        Ok(())
    }

    async fn capture(
        &mut self,
        episode_id: u32,
        round: u32,
        tag: EvidenceTag,
    ) -> Result<(Screenshot, String), RoundError> {
        let shot = self.device.screenshot().await.map_err(RoundError::Capture)?;
        let path = self.store.save_evidence(&shot, episode_id, round, tag)?;
        Ok((shot, path))
    }

    /// Tap the card until verification passes. Returns the attempt count and
    /// any verification screenshots.
    async fn tap_until_confirmed(
        &mut self,
        episode_id: u32,
        round: u32,
        target: Position,
    ) -> Result<(u32, Vec<String>), RoundError> {
        let mut evidence = Vec::new();

        for attempt in 1..=self.max_tap_attempts {
            let confirmed = match self.device.tap(target, self.timings.tap_settle).await {
                Ok(()) => self.verify(episode_id, round, attempt, &mut evidence).await?,
                Err(e) => {
                    tracing::warn!(
                        "[{}] Tap at ({}, {}) failed: {}",
                        self.device.device_id(),
                        target.x,
                        target.y,
                        e
                    );
                    false
                }
            };

            if confirmed {
                return Ok((attempt, evidence));
            }

            if attempt < self.max_tap_attempts {
                tracing::warn!(
                    "[{}] Tap not confirmed (attempt {}/{}), retrying...",
                    self.device.device_id(),
                    attempt,
                    self.max_tap_attempts
                );
                sleep(self.timings.retry_backoff).await;
            }
        }

        Err(RoundError::TapsExhausted {
            attempts: self.max_tap_attempts,
        })
    }

    async fn verify(
        &mut self,
        episode_id: u32,
        round: u32,
        attempt: u32,
        evidence: &mut Vec<String>,
    ) -> Result<bool, RoundError> {
        match self.verification.clone() {
            Verification::AssumeSuccess => {
                sleep(self.timings.assume_success_delay).await;
                Ok(true)
            }
            Verification::ColorChange { perception, prompt } => {
                sleep(self.timings.verify_settle).await;
                let (shot, path) = self
                    .capture(episode_id, round, EvidenceTag::AfterTap(attempt))
                    .await?;
                evidence.push(path);

                let response = perception.query(&shot, &prompt).await;
                tracing::debug!("Tap check VLM output: {}", response);
                Ok(classify_success(&response))
            }
        }
    }
}

#[async_trait]
impl<A: ActuationPort> RoundRunner for RoundController<A> {
    async fn play_round(&mut self, episode_id: u32, round: u32) -> Result<RoundRecord, RoundError> {
        sleep(self.timings.pre_round).await;

        let (question, question_screenshot) =
            self.capture(episode_id, round, EvidenceTag::Question).await?;

        let decision = self.decisions.decide(&question).await?;
        tracing::info!("Round {}: {} chose {}", round, self.decisions.name(), decision);

        let target = self.layout.card(decision);
        let (tap_attempts, verification_screenshots) =
            self.tap_until_confirmed(episode_id, round, target).await?;

        sleep(self.timings.feedback).await;
        let (_, result_screenshot) = self.capture(episode_id, round, EvidenceTag::Result).await?;

        self.device
            .tap(self.layout.advance, self.timings.advance_settle)
            .await
            .map_err(RoundError::Advance)?;

        Ok(RoundRecord {
            round,
            selected_index: decision,
            click_position: target,
            tap_attempts,
            question_screenshot,
            result_screenshot,
            verification_screenshots,
            timestamp: Local::now(),
        })
    }

    async fn capture_final_state(&mut self, episode_id: u32) -> FinalState {
        sleep(self.timings.final_settle).await;

        let shot = match self.device.screenshot().await {
            Ok(shot) => shot,
            Err(e) => {
                tracing::warn!("[{}] Final screenshot failed: {}", self.device.device_id(), e);
                return FinalState::default();
            }
        };

        let screenshot = self
            .store
            .save_evidence(&shot, episode_id, FINAL_ROUND_INDEX, EvidenceTag::Final)
            .map_err(|e| {
                tracing::warn!(
                    "[{}] Saving final screenshot failed: {}",
                    self.device.device_id(),
                    e
                )
            })
            .ok();

        let score = match &self.score_probe {
            Some(probe) => {
                let response = probe.perception.query(&shot, &probe.prompt).await;
                tracing::debug!("Score VLM output: {}", response);
                let score = extract_score(&response);
                if score.is_none() {
                    tracing::warn!("[{}] Could not read the final score", self.device.device_id());
                }
                score
            }
            None => None,
        };

        FinalState { screenshot, score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Decision;
    use crate::testing::{temp_output_dir, CyclingDecisions, ScriptedDevice, ScriptedPerception};
    use std::fs;

    fn controller(
        device: ScriptedDevice,
        decisions: &[u32],
        verification: Verification,
    ) -> (RoundController<ScriptedDevice>, std::path::PathBuf) {
        let root = temp_output_dir();
        let store = DeviceStore::create(&root, &device.id).unwrap();
        let controller = RoundController::new(
            device,
            Box::new(CyclingDecisions::new(decisions)),
            verification,
            Layout::play(),
            Timings::instant(),
            store,
        );
        (controller, root)
    }

    fn color_check(answers: &[&str]) -> (Verification, Arc<ScriptedPerception>) {
        let perception = Arc::new(ScriptedPerception::queued(answers.iter().copied(), "是"));
        let verification = Verification::ColorChange {
            perception: perception.clone(),
            prompt: "changed?".to_string(),
        };
        (verification, perception)
    }

    #[tokio::test]
    async fn test_round_completes_after_k_negative_checks() {
        for k in 0..DEFAULT_TAP_ATTEMPTS {
            let device = ScriptedDevice::new("X");
            let log = device.log();
            let answers = vec!["否"; k as usize];
            let (verification, perception) = color_check(&answers);
            let (mut rc, root) = controller(device, &[1], verification);

            let record = rc.play_round(1, 1).await.unwrap();
            let card = Layout::play().cards[1];

            assert_eq!(record.tap_attempts, k + 1);
            assert_eq!(log.lock().unwrap().taps_at(card), (k + 1) as usize);
            assert_eq!(log.lock().unwrap().taps_at(Layout::play().advance), 1);
            assert_eq!(record.verification_screenshots.len(), (k + 1) as usize);
            assert_eq!(perception.query_count(), (k + 1) as usize);
            assert_eq!(record.click_position, card);

            let _ = fs::remove_dir_all(&root);
        }
    }

    #[tokio::test]
    async fn test_round_fails_after_three_negative_checks() {
        for k in [3, 5] {
            let device = ScriptedDevice::new("X");
            let log = device.log();
            let answers = vec!["否"; k];
            let (verification, _) = color_check(&answers);
            let (mut rc, root) = controller(device, &[0], verification);

            let err = rc.play_round(1, 1).await.unwrap_err();
            assert!(matches!(err, RoundError::TapsExhausted { attempts: 3 }));
            assert_eq!(log.lock().unwrap().taps_at(Layout::play().cards[0]), 3);
            assert_eq!(log.lock().unwrap().taps_at(Layout::play().advance), 0);

            let _ = fs::remove_dir_all(&root);
        }
    }

    #[tokio::test]
    async fn test_tap_errors_consume_attempts() {
        let mut device = ScriptedDevice::new("X");
        device.failing_taps = 2;
        let log = device.log();
        let (mut rc, root) = controller(device, &[2], Verification::AssumeSuccess);

        let record = rc.play_round(3, 4).await.unwrap();
        assert_eq!(record.tap_attempts, 3);
        assert_eq!(record.selected_index, Decision::new(2).unwrap());
        assert_eq!(log.lock().unwrap().taps.len(), 4);
        assert!(record.verification_screenshots.is_empty());
        assert_eq!(
            record.question_screenshot,
            "X/episode_003_round_04_question.png"
        );
        assert!(root.join(&record.result_screenshot).exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_capture_failure_fails_round_without_tapping() {
        let mut device = ScriptedDevice::new("X");
        device.failing_screenshots = 1;
        let log = device.log();
        let (mut rc, root) = controller(device, &[0], Verification::AssumeSuccess);

        let err = rc.play_round(1, 1).await.unwrap_err();
        assert!(matches!(err, RoundError::Capture(_)));
        assert!(log.lock().unwrap().taps.is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_unparseable_answer_fails_round_without_retry() {
        let device = ScriptedDevice::new("X");
        let log = device.log();
        let root = temp_output_dir();
        let store = DeviceStore::create(&root, "X").unwrap();
        let perception = Arc::new(ScriptedPerception::queued(["I cannot tell"], ""));
        let mut rc = RoundController::new(
            device,
            Box::new(crate::agent::ModelDecision::new(perception.clone(), "pick")),
            Verification::AssumeSuccess,
            Layout::play(),
            Timings::instant(),
            store,
        );

        let err = rc.play_round(1, 1).await.unwrap_err();
        assert!(matches!(err, RoundError::Decision(ParseError::NoDecision)));
        assert_eq!(perception.query_count(), 1);
        assert!(log.lock().unwrap().taps.is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_verification_capture_failure_fails_round() {
        let mut device = ScriptedDevice::new("X");
        // Capture 1 is the question, capture 2 the first tap check.
        device.broken_screenshots.insert(2);
        let log = device.log();
        let (verification, perception) = color_check(&[]);
        let (mut rc, root) = controller(device, &[0], verification);

        let err = rc.play_round(1, 1).await.unwrap_err();
        assert!(matches!(err, RoundError::Capture(_)));
        assert_eq!(log.lock().unwrap().taps_at(Layout::play().cards[0]), 1);
        assert_eq!(log.lock().unwrap().taps_at(Layout::play().advance), 0);
        assert_eq!(perception.query_count(), 0);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_advance_failure_fails_round() {
        let mut device = ScriptedDevice::new("X");
        device.broken_positions.insert(Layout::play().advance);
        let (mut rc, root) = controller(device, &[1], Verification::AssumeSuccess);

        let err = rc.play_round(1, 1).await.unwrap_err();
        assert!(matches!(err, RoundError::Advance(_)));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_final_state_with_score_probe() {
        let device = ScriptedDevice::new("X");
        let (rc, root) = controller(device, &[0], Verification::AssumeSuccess);
        let mut rc = rc.with_score_probe(ScoreProbe {
            perception: Arc::new(ScriptedPerception::queued(["最终分数是 90"], "")),
            prompt: "score?".to_string(),
        });

        let state = rc.capture_final_state(2).await;
        assert_eq!(state.score, Some(90));
        assert_eq!(
            state.screenshot.as_deref(),
            Some("X/episode_002_round_99_final.png")
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_final_state_is_best_effort() {
        let mut device = ScriptedDevice::new("X");
        device.failing_screenshots = 1;
        let (mut rc, root) = controller(device, &[0], Verification::AssumeSuccess);

        assert_eq!(rc.capture_final_state(1).await, FinalState::default());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_reset_environment_runs_layout_sequence() {
        let device = ScriptedDevice::new("X");
        let log = device.log();
        let (mut rc, root) = controller(device, &[0], Verification::AssumeSuccess);

        rc.reset_environment().await.unwrap();
        assert_eq!(log.lock().unwrap().backs, 1);
        assert_eq!(log.lock().unwrap().taps, vec![crate::config::REFRESH_BUTTON]);

        let _ = fs::remove_dir_all(&root);
    }
}
