//! Multi-device session: one sequential episode loop per device, devices run
//! one after another or concurrently under a worker limit.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::Instrument;

use super::decision::{DecisionSource, ModelDecision, RandomDecision};
use super::episode::{EpisodeController, EpisodePolicy};
use super::records::{DeviceSummary, RunSummary};
use super::round::{RoundController, ScoreProbe, Verification, DEFAULT_TAP_ATTEMPTS};
use crate::config::{get_prompts, Layout, Timings};
use crate::ports::{ActuationPort, DeviceConnector, PerceptionPort};
use crate::storage::{safe_device_dir_name, save_run_summary, DeviceStore, StorageError};

/// Default concurrent devices in parallel mode.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Session configuration errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0} mode needs a vision-language model")]
    MissingPerception(GameMode),
    #[error("no devices given")]
    NoDevices,
    #[error("unknown mode: {0} (expected play or collect)")]
    UnknownMode(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What a session does on each device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// The model picks every card; taps are verified by color change.
    Play,
    /// Cards are picked at random to gather screenshots.
    Collect,
}

impl GameMode {
    pub fn default_episodes(self) -> u32 {
        match self {
            Self::Play => 1,
            Self::Collect => 10,
        }
    }

    pub fn default_output_dir(self) -> &'static str {
        match self {
            Self::Play => "game_screenshots",
            Self::Collect => "game_data_raw",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Self::Play => Layout::play(),
            Self::Collect => Layout::collect(),
        }
    }

    pub fn timings(self) -> Timings {
        match self {
            Self::Play => Timings::play(),
            Self::Collect => Timings::collect(),
        }
    }
}

impl FromStr for GameMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "collect" => Ok(Self::Collect),
            other => Err(SessionError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "play"),
            Self::Collect => write!(f, "collect"),
        }
    }
}

/// Everything a session needs besides its ports.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: GameMode,
    pub episodes_per_device: u32,
    pub output_dir: PathBuf,
    pub parallel: bool,
    pub max_workers: usize,
    /// Seed for random decisions; device `i` uses `seed + i`.
    pub seed: Option<u64>,
    /// Prompt language ("cn" or "en").
    pub lang: String,
    pub layout: Layout,
    pub timings: Timings,
    pub policy: EpisodePolicy,
    pub max_tap_attempts: u32,
}

impl SessionConfig {
    /// Defaults of the given mode.
    pub fn for_mode(mode: GameMode) -> Self {
        let timings = mode.timings();
        Self {
            mode,
            episodes_per_device: mode.default_episodes(),
            output_dir: PathBuf::from(mode.default_output_dir()),
            parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
            seed: None,
            lang: "cn".to_string(),
            layout: mode.layout(),
            policy: EpisodePolicy::from_timings(&timings),
            timings,
            max_tap_attempts: DEFAULT_TAP_ATTEMPTS,
        }
    }

    pub fn with_episodes(mut self, episodes: u32) -> Self {
        self.episodes_per_device = episodes;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Replace the delays, including the episode pacing taken from them.
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.policy.round_pacing = timings.round_pacing;
        self.policy.failure_backoff = timings.failure_backoff;
        self.timings = timings;
        self
    }

    pub fn with_policy(mut self, policy: EpisodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_tap_attempts(mut self, attempts: u32) -> Self {
        self.max_tap_attempts = attempts;
        self
    }
}

/// Runs a session over a list of devices.
pub struct SessionDriver<C: DeviceConnector> {
    config: Arc<SessionConfig>,
    connector: Arc<C>,
    perception: Option<Arc<dyn PerceptionPort>>,
}

impl<C: DeviceConnector> Clone for SessionDriver<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            perception: self.perception.clone(),
        }
    }
}

impl<C: DeviceConnector + 'static> SessionDriver<C> {
    /// Play mode requires a perception port; collect mode ignores it.
    pub fn new(
        config: SessionConfig,
        connector: C,
        perception: Option<Arc<dyn PerceptionPort>>,
    ) -> Result<Self, SessionError> {
        if config.mode == GameMode::Play && perception.is_none() {
            return Err(SessionError::MissingPerception(config.mode));
        }
        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            perception,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run every device and write `total_summary.json`. Device failures are
    /// recorded in the summary, not returned.
    pub async fn run(&self, device_ids: &[String]) -> Result<RunSummary, SessionError> {
        let devices = distinct_devices(device_ids);
        let device_ids = devices.as_slice();
        if device_ids.is_empty() {
            return Err(SessionError::NoDevices);
        }
        std::fs::create_dir_all(&self.config.output_dir).map_err(StorageError::from)?;

        tracing::info!(
            "Starting {} session: {} device(s), {} episode(s) each, output {}",
            self.config.mode,
            device_ids.len(),
            self.config.episodes_per_device,
            self.config.output_dir.display()
        );

        let started = Instant::now();
        let summaries = if self.config.parallel && device_ids.len() > 1 {
            self.run_parallel(device_ids).await
        } else {
            let mut summaries = Vec::with_capacity(device_ids.len());
            for (index, device_id) in device_ids.iter().enumerate() {
                summaries.push(self.run_device(index, device_id).await);
            }
            summaries
        };

        let summary = RunSummary::aggregate(
            self.config.mode.to_string(),
            self.config.episodes_per_device,
            self.config.output_dir.display().to_string(),
            started.elapsed().as_secs_f64(),
            summaries,
        );
        let path = save_run_summary(&self.config.output_dir, &summary)?;
        tracing::info!("Run summary saved to {}", path.display());

        Ok(summary)
    }

    async fn run_parallel(&self, device_ids: &[String]) -> Vec<DeviceSummary> {
        let workers = self.config.max_workers.clamp(1, device_ids.len());
        tracing::info!("Parallel mode: {} worker(s)", workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (index, device_id) in device_ids.iter().enumerate() {
            let driver = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let device_id = device_id.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, driver.run_device(index, &device_id).await)
            });
        }

        let mut slots: Vec<Option<DeviceSummary>> = vec![None; device_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, summary)) => slots[index] = Some(summary),
                Err(e) => tracing::error!("Device task aborted: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(device_ids)
            .map(|(slot, device_id)| {
                slot.unwrap_or_else(|| {
                    let dir = self.device_dir(device_id);
                    DeviceSummary::failed(device_id, dir, "device task aborted")
                })
            })
            .collect()
    }

    fn device_dir(&self, device_id: &str) -> String {
        self.config
            .output_dir
            .join(safe_device_dir_name(device_id))
            .display()
            .to_string()
    }

    async fn run_device(&self, index: usize, device_id: &str) -> DeviceSummary {
        let span = tracing::info_span!("device", id = %device_id);
        self.run_device_inner(index, device_id).instrument(span).await
    }

    async fn run_device_inner(&self, index: usize, device_id: &str) -> DeviceSummary {
        let output_dir = self.device_dir(device_id);

        let store = match DeviceStore::create(&self.config.output_dir, device_id) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("[{}] Cannot create output directory: {}", device_id, e);
                return DeviceSummary::failed(device_id, output_dir, e);
            }
        };

        let mut device = match self.connector.connect(device_id).await {
            Ok(device) => device,
            Err(e) => {
                tracing::error!("[{}] Device setup failed: {}", device_id, e);
                let summary = DeviceSummary::failed(device_id, output_dir, &e);
                if let Err(e) = store.save_summary(&summary) {
                    tracing::error!("[{}] Failed to save device summary: {}", device_id, e);
                }
                return summary;
            }
        };

        let resolution = device.screen_resolution().await;
        tracing::info!("[{}] Connected, screen {}x{}", device_id, resolution.0, resolution.1);

        let mut controller = match self.build_controller(index, device, store.clone()) {
            Ok(controller) => controller,
            Err(e) => return DeviceSummary::failed(device_id, output_dir, e),
        };
        let episodes = EpisodeController::new(self.config.policy.clone());

        let first_episode = store.next_episode_id();
        if first_episode > 1 {
            tracing::info!("[{}] Resuming at episode {}", device_id, first_episode);
        }

        let mut records = Vec::with_capacity(self.config.episodes_per_device as usize);
        for n in 0..self.config.episodes_per_device {
            if n > 0 {
                if let Err(e) = controller.reset_environment().await {
                    tracing::warn!("[{}] Environment reset failed: {}", device_id, e);
                }
                sleep(self.config.timings.episode_gap).await;
            }
            let record = episodes
                .run(&mut controller, first_episode + n, device_id, &store)
                .await;
            records.push(record);
        }

        let summary = DeviceSummary::from_episodes(device_id, resolution, output_dir, records);
        tracing::info!(
            "[{}] Done: {}/{} episodes successful, {} rounds",
            device_id,
            summary.successful_episodes,
            summary.total_episodes,
            summary.total_rounds_collected
        );
        if let Err(e) = store.save_summary(&summary) {
            tracing::error!("[{}] Failed to save device summary: {}", device_id, e);
        }
        summary
    }

    fn build_controller(
        &self,
        index: usize,
        device: C::Device,
        store: DeviceStore,
    ) -> Result<RoundController<C::Device>, SessionError> {
        let prompts = get_prompts(&self.config.lang);

        let controller = match self.config.mode {
            GameMode::Play => {
                let perception = self
                    .perception
                    .clone()
                    .ok_or(SessionError::MissingPerception(GameMode::Play))?;
                let decisions: Box<dyn DecisionSource> =
                    Box::new(ModelDecision::new(Arc::clone(&perception), prompts.decision));
                RoundController::new(
                    device,
                    decisions,
                    Verification::ColorChange {
                        perception: Arc::clone(&perception),
                        prompt: prompts.verify.to_string(),
                    },
                    self.config.layout.clone(),
                    self.config.timings.clone(),
                    store,
                )
                .with_score_probe(ScoreProbe {
                    perception,
                    prompt: prompts.score.to_string(),
                })
            }
            GameMode::Collect => {
                let decisions = match self.config.seed {
                    Some(seed) => RandomDecision::seeded(seed.wrapping_add(index as u64)),
                    None => RandomDecision::from_entropy(),
                };
                RoundController::new(
                    device,
                    Box::new(decisions),
                    Verification::AssumeSuccess,
                    self.config.layout.clone(),
                    self.config.timings.clone(),
                    store,
                )
            }
        };

        Ok(controller.with_max_tap_attempts(self.config.max_tap_attempts))
    }
}

/// Drop repeated ids, keeping first-seen order. Ids that map to the same
/// output directory count as repeats.
fn distinct_devices(device_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    device_ids
        .iter()
        .filter(|id| {
            let fresh = seen.insert(safe_device_dir_name(id));
            if !fresh {
                tracing::warn!("Skipping duplicate device {}", id);
            }
            fresh
        })
        .cloned()
        .collect()
}
