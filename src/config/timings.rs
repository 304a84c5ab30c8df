//! Fixed delays of the automation loop.

use std::time::Duration;

/// Every wait the controllers perform, in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Pause before a round starts; spreads ADB load across parallel devices.
    pub pre_round: Duration,
    /// Settle after tapping a card.
    pub tap_settle: Duration,
    /// Wait before capturing the color-change verification screenshot.
    pub verify_settle: Duration,
    /// Wait that stands in for a check under optimistic verification.
    pub assume_success_delay: Duration,
    /// Backoff between tap attempts.
    pub retry_backoff: Duration,
    /// Wait for the round feedback to render.
    pub feedback: Duration,
    /// Settle after tapping "next round".
    pub advance_settle: Duration,
    /// Between successful rounds.
    pub round_pacing: Duration,
    /// After a failed round.
    pub failure_backoff: Duration,
    /// Wait for the end-of-game animation before the final capture.
    pub final_settle: Duration,
    /// Settle after each reset step.
    pub reset_step_settle: Duration,
    /// Page reload time after the reset sequence.
    pub reset_settle: Duration,
    /// Between episodes on the same device.
    pub episode_gap: Duration,
}

impl Timings {
    /// Delays used when the model plays.
    pub fn play() -> Self {
        Self {
            pre_round: Duration::ZERO,
            tap_settle: Duration::from_millis(1500),
            verify_settle: Duration::from_millis(1000),
            assume_success_delay: Duration::from_millis(800),
            retry_backoff: Duration::from_millis(500),
            feedback: Duration::from_millis(1500),
            advance_settle: Duration::from_millis(1500),
            round_pacing: Duration::from_millis(1500),
            failure_backoff: Duration::from_millis(2000),
            final_settle: Duration::from_millis(2000),
            reset_step_settle: Duration::from_millis(1000),
            reset_settle: Duration::from_millis(3000),
            episode_gap: Duration::from_secs(5),
        }
    }

    /// Delays used for random data collection.
    pub fn collect() -> Self {
        Self {
            pre_round: Duration::from_millis(300),
            tap_settle: Duration::from_millis(1000),
            verify_settle: Duration::from_millis(1000),
            assume_success_delay: Duration::from_millis(800),
            retry_backoff: Duration::from_millis(500),
            feedback: Duration::from_millis(1700),
            advance_settle: Duration::from_millis(1000),
            round_pacing: Duration::from_millis(1000),
            failure_backoff: Duration::from_millis(1500),
            final_settle: Duration::from_millis(2000),
            reset_step_settle: Duration::from_millis(1000),
            reset_settle: Duration::from_millis(3000),
            episode_gap: Duration::from_secs(2),
        }
    }

    /// No waiting at all.
    pub fn instant() -> Self {
        Self {
            pre_round: Duration::ZERO,
            tap_settle: Duration::ZERO,
            verify_settle: Duration::ZERO,
            assume_success_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            feedback: Duration::ZERO,
            advance_settle: Duration::ZERO,
            round_pacing: Duration::ZERO,
            failure_backoff: Duration::ZERO,
            final_settle: Duration::ZERO,
            reset_step_settle: Duration::ZERO,
            reset_settle: Duration::ZERO,
            episode_gap: Duration::ZERO,
        }
    }
}
