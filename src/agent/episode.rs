//! Episode loop: play rounds until the target is reached or attempts run out.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

use super::records::{EpisodeRecord, FinalState, RoundRecord};
use super::round::RoundError;
use crate::config::Timings;
use crate::storage::DeviceStore;

/// Rounds in one game.
pub const DEFAULT_TARGET_ROUNDS: u32 = 10;

/// Round attempts allowed per episode, successful or not.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Something that can play one round at a time.
#[async_trait]
pub trait RoundRunner: Send {
    /// Play round `round` of episode `episode_id`.
    async fn play_round(&mut self, episode_id: u32, round: u32) -> Result<RoundRecord, RoundError>;

    /// Capture the end-of-game state. Never fails the episode.
    async fn capture_final_state(&mut self, episode_id: u32) -> FinalState;
}

/// Limits and pacing of an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePolicy {
    pub target_rounds: u32,
    pub max_attempts: u32,
    pub round_pacing: Duration,
    pub failure_backoff: Duration,
}

impl Default for EpisodePolicy {
    fn default() -> Self {
        Self::from_timings(&Timings::play())
    }
}

impl EpisodePolicy {
    pub fn from_timings(timings: &Timings) -> Self {
        Self {
            target_rounds: DEFAULT_TARGET_ROUNDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            round_pacing: timings.round_pacing,
            failure_backoff: timings.failure_backoff,
        }
    }

    pub fn with_target_rounds(mut self, rounds: u32) -> Self {
        self.target_rounds = rounds;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Drives one episode on one device.
pub struct EpisodeController {
    policy: EpisodePolicy,
}

impl EpisodeController {
    pub fn new(policy: EpisodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EpisodePolicy {
        &self.policy
    }

    /// Run one episode and persist its record. Round failures are logged
    /// and retried under the same round number.
    pub async fn run<R: RoundRunner + ?Sized>(
        &self,
        runner: &mut R,
        episode_id: u32,
        device_id: &str,
        store: &DeviceStore,
    ) -> EpisodeRecord {
        let mut record = EpisodeRecord::start(episode_id, device_id, self.policy.target_rounds);
        let mut attempts = 0;

        tracing::info!("[{}] Episode {} started", device_id, episode_id);

        while !record.is_complete() && attempts < self.policy.max_attempts {
            attempts += 1;
            let round = record.completed_rounds + 1;

            match runner.play_round(episode_id, round).await {
                Ok(round_record) => {
                    tracing::info!(
                        "[{}] Round {}/{} done ({} tap attempts)",
                        device_id,
                        round,
                        self.policy.target_rounds,
                        round_record.tap_attempts
                    );
                    record.push_round(round_record);
                    if !record.is_complete() {
                        sleep(self.policy.round_pacing).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "[{}] Round {} failed (attempt {}/{}): {}",
                        device_id,
                        round,
                        attempts,
                        self.policy.max_attempts,
                        e
                    );
                    sleep(self.policy.failure_backoff).await;
                }
            }
        }

        let final_state = runner.capture_final_state(episode_id).await;
        record.finish(attempts, final_state);

        if let Err(e) = store.save_episode(&record) {
            tracing::error!("[{}] Failed to save episode {}: {}", device_id, episode_id, e);
        }

        if record.success {
            tracing::info!(
                "[{}] Episode {} complete: {} rounds in {} attempts",
                device_id,
                episode_id,
                record.completed_rounds,
                attempts
            );
        } else {
            tracing::warn!(
                "[{}] Episode {} ended with {}/{} rounds after {} attempts",
                device_id,
                episode_id,
                record.completed_rounds,
                record.target_rounds,
                attempts
            );
        }

        record
    }
}
