//! Saved defaults for the game-agent CLI.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::DEFAULT_MAX_WORKERS;
use crate::model::{DEFAULT_API_URL, DEFAULT_MODEL_NAME};

/// Settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model backend ("ollama" or "vllm")
    pub model_type: String,
    /// Model API base URL
    pub api_url: String,
    /// Model name
    pub model_name: String,
    /// Prompt language ("cn" or "en")
    pub lang: String,
    /// Path to the adb executable
    pub adb_path: String,
    /// Concurrent devices in parallel mode
    pub max_workers: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_type: "ollama".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            lang: "cn".to_string(),
            adb_path: "adb".to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "gameagent", "game-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, or defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`; unreadable files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        let defaults = Self::default();

        let mut loaded: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        // Backfill fields blanked by hand-edited files
        if loaded.model_type.is_empty() {
            loaded.model_type = defaults.model_type;
        }
        if loaded.api_url.is_empty() {
            loaded.api_url = defaults.api_url;
        }
        if loaded.model_name.is_empty() {
            loaded.model_name = defaults.model_name;
        }
        if loaded.adb_path.is_empty() {
            loaded.adb_path = defaults.adb_path;
        }
        if loaded.max_workers == 0 {
            loaded.max_workers = defaults.max_workers;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::settings_path().ok_or("Cannot determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_output_dir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = temp_output_dir().join("settings.json");
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = temp_output_dir();
        let path = dir.join("nested").join("settings.json");
        let settings = AppSettings {
            model_type: "vllm".to_string(),
            api_url: "http://gpu-box:8000".to_string(),
            max_workers: 8,
            ..AppSettings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path), settings);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_file_is_backfilled() {
        let dir = temp_output_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"model_name": "", "lang": "en", "max_workers": 0}"#).unwrap();

        let loaded = AppSettings::load_from(&path);
        assert_eq!(loaded.lang, "en");
        assert_eq!(loaded.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(loaded.max_workers, 4);
        assert_eq!(loaded.model_type, "ollama");

        let _ = fs::remove_dir_all(&dir);
    }
}
