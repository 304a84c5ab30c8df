// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Game Agent
//!
//! Automates a three-card mini-game on Android devices. Each round the agent
//! captures the screen over ADB, asks a vision-language model (or a seeded
//! random source) which card to pick, taps it, verifies the tap took effect
//! and records screenshots plus JSON metadata for later training.
//!
//! The two unreliable collaborators sit behind [`ports`]: the device bridge
//! ([`adb::AdbConnector`]) and the model ([`model::ModelClient`]).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use game_agent::{AdbConnector, GameMode, ModelClient, ModelConfig, SessionConfig, SessionDriver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model = Arc::new(ModelClient::new(ModelConfig::default())?);
//!     let config = SessionConfig::for_mode(GameMode::Play).with_episodes(2);
//!     let driver = SessionDriver::new(config, AdbConnector::new(), Some(model))?;
//!
//!     let summary = driver.run(&["emulator-5554".to_string()]).await?;
//!     println!("{} rounds collected", summary.total_rounds_collected);
//!     Ok(())
//! }
//! ```

pub mod adb;
pub mod agent;
pub mod config;
pub mod model;
pub mod parser;
pub mod ports;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod testing;

pub use adb::{AdbConnector, AdbDevice, DeviceError, Screenshot};
pub use agent::{
    DeviceSummary, EpisodeController, EpisodePolicy, EpisodeRecord, GameMode, RoundController,
    RoundError, RoundRecord, RunSummary, SessionConfig, SessionDriver, SessionError, Verification,
};
pub use config::{Layout, Position, Timings};
pub use model::{ModelBackend, ModelClient, ModelConfig};
pub use parser::{classify_success, extract_score, parse_decision, Decision, ParseError};
pub use ports::{ActuationPort, DeviceConnector, PerceptionPort};
pub use settings::AppSettings;
