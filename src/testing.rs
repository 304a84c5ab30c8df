//! Scripted ports for controller tests.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adb::{DeviceError, Screenshot};
use crate::agent::DecisionSource;
use crate::config::Position;
use crate::parser::{Decision, ParseError};
use crate::ports::{ActuationPort, DeviceConnector, PerceptionPort};

/// Encode a black PNG of the given size.
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// A fresh, unique directory under the system temp dir.
pub(crate) fn temp_output_dir() -> PathBuf {
    std::env::temp_dir().join(format!("game_agent_test_{}", uuid::Uuid::new_v4()))
}

/// What a scripted device was asked to do.
#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub taps: Vec<Position>,
    pub backs: u32,
    pub screenshots: u32,
}

impl DeviceLog {
    pub fn taps_at(&self, at: Position) -> usize {
        self.taps.iter().filter(|p| **p == at).count()
    }
}

pub(crate) struct ScriptedDevice {
    pub id: String,
    pub resolution: (u32, u32),
    pub log: Arc<Mutex<DeviceLog>>,
    /// The first N taps fail.
    pub failing_taps: u32,
    /// The first N screenshots fail.
    pub failing_screenshots: u32,
    /// Screenshots with these 1-based sequence numbers fail.
    pub broken_screenshots: HashSet<u32>,
    /// Taps here always fail.
    pub broken_positions: HashSet<Position>,
    png: Vec<u8>,
}

impl ScriptedDevice {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            resolution: (1080, 2400),
            log: Arc::new(Mutex::new(DeviceLog::default())),
            failing_taps: 0,
            failing_screenshots: 0,
            broken_screenshots: HashSet::new(),
            broken_positions: HashSet::new(),
            png: png_bytes(8, 8),
        }
    }

    pub fn log(&self) -> Arc<Mutex<DeviceLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl ActuationPort for ScriptedDevice {
    fn device_id(&self) -> &str {
        &self.id
    }

    async fn screenshot(&mut self) -> Result<Screenshot, DeviceError> {
        let seq = {
            let mut log = self.log.lock().unwrap();
            log.screenshots += 1;
            log.screenshots
        };
        if self.broken_screenshots.contains(&seq) {
            return Err(DeviceError::Capture(format!("scripted failure of capture {}", seq)));
        }
        if self.failing_screenshots > 0 {
            self.failing_screenshots -= 1;
            return Err(DeviceError::Capture("scripted capture failure".to_string()));
        }
        Screenshot::from_png(self.png.clone())
    }

    async fn tap(&mut self, at: Position, _settle: Duration) -> Result<(), DeviceError> {
        self.log.lock().unwrap().taps.push(at);
        if self.broken_positions.contains(&at) {
            return Err(DeviceError::Actuation(format!("scripted failure at {:?}", at)));
        }
        if self.failing_taps > 0 {
            self.failing_taps -= 1;
            return Err(DeviceError::Actuation("scripted tap failure".to_string()));
        }
        Ok(())
    }

    async fn press_back(&mut self, _settle: Duration) -> Result<(), DeviceError> {
        self.log.lock().unwrap().backs += 1;
        Ok(())
    }

    async fn screen_resolution(&mut self) -> (u32, u32) {
        self.resolution
    }
}

/// Connects every id except the ones listed as unreachable.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    pub unreachable: HashSet<String>,
    pub logs: Mutex<Vec<(String, Arc<Mutex<DeviceLog>>)>>,
}

impl ScriptedConnector {
    pub fn log_for(&self, device_id: &str) -> Arc<Mutex<DeviceLog>> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, log)| Arc::clone(log))
            .unwrap()
    }
}

#[async_trait]
impl DeviceConnector for ScriptedConnector {
    type Device = ScriptedDevice;

    async fn connect(&self, device_id: &str) -> Result<ScriptedDevice, DeviceError> {
        if self.unreachable.contains(device_id) {
            return Err(DeviceError::Connection(format!("{} not found", device_id)));
        }
        let device = ScriptedDevice::new(device_id);
        self.logs
            .lock()
            .unwrap()
            .push((device_id.to_string(), device.log()));
        Ok(device)
    }
}

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Answers from a queue, then from a prompt-based responder.
pub(crate) struct ScriptedPerception {
    queue: Mutex<VecDeque<String>>,
    responder: Responder,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedPerception {
    pub fn queued<I, S>(answers: I, then: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let then = then.to_string();
        Self {
            queue: Mutex::new(answers.into_iter().map(Into::into).collect()),
            responder: Box::new(move |_| then.clone()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn by_prompt(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn query_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl PerceptionPort for ScriptedPerception {
    async fn query(&self, _image: &Screenshot, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let queued = self.queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| (self.responder)(prompt))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Replays decisions in a cycle.
pub(crate) struct CyclingDecisions {
    sequence: Vec<u32>,
    next: usize,
}

impl CyclingDecisions {
    pub fn new(sequence: &[u32]) -> Self {
        Self {
            sequence: sequence.to_vec(),
            next: 0,
        }
    }
}

#[async_trait]
impl DecisionSource for CyclingDecisions {
    async fn decide(&mut self, _screenshot: &Screenshot) -> Result<Decision, ParseError> {
        let value = self.sequence[self.next % self.sequence.len()];
        self.next += 1;
        Decision::try_from(value)
    }

    fn name(&self) -> String {
        "cycling".to_string()
    }
}
