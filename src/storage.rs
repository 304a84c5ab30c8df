//! On-disk layout of collected evidence.
//!
//! ```text
//! <output_dir>/
//!   total_summary.json
//!   <device>/                      device id with ':' and '.' replaced by '_'
//!     episode_001_round_01_question.png
//!     episode_001_round_01_after_tap_1.png
//!     episode_001_round_01_result.png
//!     episode_001_round_99_final.png
//!     episode_001_metadata.json
//!     device_summary.json
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::adb::Screenshot;
use crate::agent::{DeviceSummary, EpisodeRecord, RunSummary};

/// Round index used in the file name of the end-of-episode screenshot.
pub const FINAL_ROUND_INDEX: u32 = 99;

pub const DEVICE_SUMMARY_FILE: &str = "device_summary.json";
pub const RUN_SUMMARY_FILE: &str = "total_summary.json";

static EPISODE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^episode_([0-9]+)_metadata\.json$").expect("static pattern"));

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Role of a screenshot within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceTag {
    /// Before the decision: lights and options.
    Question,
    /// Verification capture after the n-th card tap.
    AfterTap(u32),
    /// After feedback rendered, showing the correct answer.
    Result,
    /// End-of-game screen.
    Final,
}

impl EvidenceTag {
    pub fn suffix(&self) -> String {
        match self {
            Self::Question => "question".to_string(),
            Self::AfterTap(n) => format!("after_tap_{}", n),
            Self::Result => "result".to_string(),
            Self::Final => "final".to_string(),
        }
    }
}

/// Directory name for a device id.
pub fn safe_device_dir_name(device_id: &str) -> String {
    device_id.replace([':', '.'], "_")
}

pub fn evidence_file_name(episode_id: u32, round: u32, tag: EvidenceTag) -> String {
    format!("episode_{:03}_round_{:02}_{}.png", episode_id, round, tag.suffix())
}

pub fn episode_file_name(episode_id: u32) -> String {
    format!("episode_{:03}_metadata.json", episode_id)
}

/// The directory one device writes into. No two devices share one.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    dir: PathBuf,
    dir_name: String,
}

impl DeviceStore {
    /// Create `<root>/<safe device id>` if needed.
    pub fn create(root: &Path, device_id: &str) -> Result<Self, StorageError> {
        let dir_name = safe_device_dir_name(device_id);
        let dir = root.join(&dir_name);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, dir_name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a screenshot; returns its path relative to the output root.
    pub fn save_evidence(
        &self,
        screenshot: &Screenshot,
        episode_id: u32,
        round: u32,
        tag: EvidenceTag,
    ) -> Result<String, StorageError> {
        let file_name = evidence_file_name(episode_id, round, tag);
        screenshot.save(&self.dir.join(&file_name))?;
        tracing::debug!("Saved screenshot {}/{}", self.dir_name, file_name);
        Ok(format!("{}/{}", self.dir_name, file_name))
    }

    pub fn save_episode(&self, record: &EpisodeRecord) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(episode_file_name(record.episode_id));
        write_json(&path, record)?;
        Ok(path)
    }

    pub fn load_episode(&self, episode_id: u32) -> Result<EpisodeRecord, StorageError> {
        read_json(&self.dir.join(episode_file_name(episode_id)))
    }

    pub fn save_summary(&self, summary: &DeviceSummary) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(DEVICE_SUMMARY_FILE);
        write_json(&path, summary)?;
        Ok(path)
    }

    /// First episode id not yet used in this directory, so a rerun never
    /// overwrites collected data.
    pub fn next_episode_id(&self) -> u32 {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 1;
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let caps = EPISODE_FILE.captures(name.to_str()?)?;
                caps[1].parse::<u32>().ok()
            })
            .max()
            .map_or(1, |max| max + 1)
    }
}

pub fn save_run_summary(root: &Path, summary: &RunSummary) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(root)?;
    let path = root.join(RUN_SUMMARY_FILE);
    write_json(&path, summary)?;
    Ok(path)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{FinalState, RoundRecord};
    use crate::config::Position;
    use crate::parser::Decision;
    use crate::testing::{png_bytes, temp_output_dir};

    #[test]
    fn test_safe_device_dir_name() {
        assert_eq!(safe_device_dir_name("101.43.137.83:5555"), "101_43_137_83_5555");
        assert_eq!(safe_device_dir_name("emulator-5554"), "emulator-5554");
    }

    #[test]
    fn test_evidence_file_name() {
        assert_eq!(
            evidence_file_name(1, 3, EvidenceTag::Question),
            "episode_001_round_03_question.png"
        );
        assert_eq!(
            evidence_file_name(12, 10, EvidenceTag::AfterTap(2)),
            "episode_012_round_10_after_tap_2.png"
        );
        assert_eq!(
            evidence_file_name(2, FINAL_ROUND_INDEX, EvidenceTag::Final),
            "episode_002_round_99_final.png"
        );
    }

    #[test]
    fn test_save_evidence_returns_relative_path() {
        let root = temp_output_dir();
        let store = DeviceStore::create(&root, "10.0.0.2:5555").unwrap();
        let shot = Screenshot::from_png(png_bytes(4, 4)).unwrap();

        let rel = store.save_evidence(&shot, 1, 2, EvidenceTag::Result).unwrap();
        assert_eq!(rel, "10_0_0_2_5555/episode_001_round_02_result.png");
        assert!(root.join(&rel).exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_episode_json_round_trip() {
        let root = temp_output_dir();
        let store = DeviceStore::create(&root, "X").unwrap();

        let mut record = EpisodeRecord::start(4, "X", 10);
        for round in 1..=3 {
            let decision = Decision::new(round % 3).unwrap();
            record.push_round(RoundRecord {
                round,
                selected_index: decision,
                click_position: Position::new(135, 905),
                tap_attempts: 2,
                question_screenshot: format!("X/episode_004_round_{:02}_question.png", round),
                result_screenshot: format!("X/episode_004_round_{:02}_result.png", round),
                verification_screenshots: vec!["X/a.png".to_string()],
                timestamp: chrono::Local::now(),
            });
        }
        record.finish(
            5,
            FinalState {
                screenshot: Some("X/episode_004_round_99_final.png".to_string()),
                score: Some(30),
            },
        );

        store.save_episode(&record).unwrap();
        let loaded = store.load_episode(4).unwrap();
        assert_eq!(loaded, record);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_next_episode_id_resumes_after_existing() {
        let root = temp_output_dir();
        let store = DeviceStore::create(&root, "dev").unwrap();
        assert_eq!(store.next_episode_id(), 1);

        fs::write(store.dir().join("episode_002_metadata.json"), "{}").unwrap();
        fs::write(store.dir().join("episode_007_metadata.json"), "{}").unwrap();
        fs::write(store.dir().join("episode_abc_metadata.json"), "{}").unwrap();
        fs::write(store.dir().join("episode_009_round_01_question.png"), "").unwrap();
        assert_eq!(store.next_episode_id(), 8);

        let _ = fs::remove_dir_all(&root);
    }
}
