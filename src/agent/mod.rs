//! Game automation: rounds, episodes and multi-device sessions.

mod decision;
mod episode;
mod records;
mod round;
mod session;

pub use decision::{DecisionSource, ModelDecision, RandomDecision};
pub use episode::{
    EpisodeController, EpisodePolicy, RoundRunner, DEFAULT_MAX_ATTEMPTS, DEFAULT_TARGET_ROUNDS,
};
pub use records::{DeviceSummary, EpisodeRecord, FinalState, RoundRecord, RunSummary};
pub use round::{RoundController, RoundError, ScoreProbe, Verification, DEFAULT_TAP_ATTEMPTS};
pub use session::{GameMode, SessionConfig, SessionDriver, SessionError, DEFAULT_MAX_WORKERS};
