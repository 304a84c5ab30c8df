//! Per-round, per-episode and per-run records persisted as JSON.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::Position;
use crate::parser::Decision;

/// Evidence of one completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub selected_index: Decision,
    pub click_position: Position,
    /// Card taps issued before verification succeeded (1..=3).
    pub tap_attempts: u32,
    pub question_screenshot: String,
    pub result_screenshot: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_screenshots: Vec<String>,
    pub timestamp: DateTime<Local>,
}

/// What the episode saw after its last round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalState {
    pub screenshot: Option<String>,
    pub score: Option<u32>,
}

/// One game of `target_rounds` rounds on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode_id: u32,
    pub device_id: String,
    pub target_rounds: u32,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub rounds: Vec<RoundRecord>,
    pub completed_rounds: u32,
    pub total_attempts: u32,
    pub success: bool,
    pub final_screenshot: Option<String>,
    pub final_score: Option<u32>,
}

impl EpisodeRecord {
    pub fn start(episode_id: u32, device_id: impl Into<String>, target_rounds: u32) -> Self {
        Self {
            episode_id,
            device_id: device_id.into(),
            target_rounds,
            start_time: Local::now(),
            end_time: None,
            rounds: Vec::new(),
            completed_rounds: 0,
            total_attempts: 0,
            success: false,
            final_screenshot: None,
            final_score: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_rounds >= self.target_rounds
    }

    /// Append a completed round. Rounds past the target are ignored.
    pub fn push_round(&mut self, record: RoundRecord) {
        if self.is_complete() {
            tracing::warn!(
                "Episode {} already has {} rounds, dropping round {}",
                self.episode_id,
                self.target_rounds,
                record.round
            );
            return;
        }
        self.rounds.push(record);
        self.completed_rounds = self.rounds.len() as u32;
    }

    /// Close the episode; `success` is derived, never set directly.
    pub fn finish(&mut self, total_attempts: u32, final_state: FinalState) {
        self.total_attempts = total_attempts;
        self.completed_rounds = self.rounds.len() as u32;
        self.success = self.completed_rounds == self.target_rounds;
        self.final_screenshot = final_state.screenshot;
        self.final_score = final_state.score;
        self.end_time = Some(Local::now());
    }
}

/// All episodes of one device, or the reason the device never started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub screen_resolution: Option<(u32, u32)>,
    pub total_episodes: u32,
    pub successful_episodes: u32,
    pub total_rounds_collected: u32,
    /// When the device finished, in play and collect runs alike.
    pub finished_at: DateTime<Local>,
    pub output_dir: String,
    pub episodes: Vec<EpisodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceSummary {
    pub fn from_episodes(
        device_id: impl Into<String>,
        screen_resolution: (u32, u32),
        output_dir: impl Into<String>,
        episodes: Vec<EpisodeRecord>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            screen_resolution: Some(screen_resolution),
            total_episodes: episodes.len() as u32,
            successful_episodes: episodes.iter().filter(|e| e.success).count() as u32,
            total_rounds_collected: episodes.iter().map(|e| e.completed_rounds).sum(),
            finished_at: Local::now(),
            output_dir: output_dir.into(),
            episodes,
            error: None,
        }
    }

    /// Summary for a device whose setup failed.
    pub fn failed(
        device_id: impl Into<String>,
        output_dir: impl Into<String>,
        error: impl ToString,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            screen_resolution: None,
            total_episodes: 0,
            successful_episodes: 0,
            total_rounds_collected: 0,
            finished_at: Local::now(),
            output_dir: output_dir.into(),
            episodes: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate over every device of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: String,
    pub total_devices: u32,
    pub failed_devices: u32,
    pub episodes_per_device: u32,
    pub total_episodes_collected: u32,
    pub successful_episodes: u32,
    pub total_rounds_collected: u32,
    pub elapsed_seconds: f64,
    pub output_dir: String,
    pub timestamp: DateTime<Local>,
    pub device_summaries: Vec<DeviceSummary>,
}

impl RunSummary {
    pub fn aggregate(
        mode: impl Into<String>,
        episodes_per_device: u32,
        output_dir: impl Into<String>,
        elapsed_seconds: f64,
        device_summaries: Vec<DeviceSummary>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode: mode.into(),
            total_devices: device_summaries.len() as u32,
            failed_devices: device_summaries.iter().filter(|s| s.error.is_some()).count() as u32,
            episodes_per_device,
            total_episodes_collected: device_summaries.iter().map(|s| s.total_episodes).sum(),
            successful_episodes: device_summaries.iter().map(|s| s.successful_episodes).sum(),
            total_rounds_collected: device_summaries.iter().map(|s| s.total_rounds_collected).sum(),
            elapsed_seconds,
            output_dir: output_dir.into(),
            timestamp: Local::now(),
            device_summaries,
        }
    }
}
