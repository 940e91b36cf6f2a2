//! Persistent settings for the voice agent.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{LoopConfig, CONTEXT_WINDOW};
use crate::model::{PlannerConfig, DEFAULT_MAX_RETRIES, DEFAULT_PLANNER_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS};
use crate::wake::{TriggerConfig, WakeConfig};

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Planner API base URL
    pub planner_base_url: String,
    /// Planner API key
    pub planner_api_key: String,
    /// Planner model name
    pub planner_model_name: String,
    /// Maximum retries for planner requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Planner request timeout in seconds
    pub planner_timeout_secs: u64,
    /// ADB device ID (optional)
    pub device_id: String,
    pub wake_phrase: String,
    pub fallback_phrases: Vec<String>,
    /// Access key for the keyword engine
    pub wake_access_key: String,
    /// Keyword model file (optional)
    pub wake_model_path: String,
    /// Delay after a detection before listening again, in milliseconds
    pub settle_delay_ms: u64,
    pub max_attempts: u32,
    pub max_consecutive_failures: u32,
    /// Delay between automation cycles in milliseconds
    pub step_delay_ms: u64,
    /// History entries shown to the planner
    pub history_window: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        let trigger = TriggerConfig::default();
        Self {
            planner_base_url: "http://localhost:8000/v1".to_string(),
            planner_api_key: "EMPTY".to_string(),
            planner_model_name: "autoglm-phone-9b".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            planner_timeout_secs: DEFAULT_PLANNER_TIMEOUT_SECS,
            device_id: String::new(),
            wake_phrase: trigger.wake_phrase,
            fallback_phrases: trigger.fallback_phrases,
            wake_access_key: String::new(),
            wake_model_path: String::new(),
            settle_delay_ms: 750,
            max_attempts: 10,
            max_consecutive_failures: 3,
            step_delay_ms: 500,
            history_window: CONTEXT_WINDOW,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "voice-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let loaded: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        loaded.backfilled()
    }

    /// Fill fields that older config files left empty.
    fn backfilled(mut self) -> Self {
        let defaults = Self::default();
        if self.planner_base_url.is_empty() {
            self.planner_base_url = defaults.planner_base_url;
        }
        if self.planner_api_key.is_empty() {
            self.planner_api_key = defaults.planner_api_key;
        }
        if self.planner_model_name.is_empty() {
            self.planner_model_name = defaults.planner_model_name;
        }
        if self.planner_timeout_secs == 0 {
            self.planner_timeout_secs = defaults.planner_timeout_secs;
        }
        if self.wake_phrase.is_empty() {
            self.wake_phrase = defaults.wake_phrase;
        }
        if self.fallback_phrases.is_empty() {
            self.fallback_phrases = defaults.fallback_phrases;
        }
        if self.settle_delay_ms == 0 {
            self.settle_delay_ms = defaults.settle_delay_ms;
        }
        if self.max_attempts == 0 {
            self.max_attempts = defaults.max_attempts;
        }
        if self.max_consecutive_failures == 0 {
            self.max_consecutive_failures = defaults.max_consecutive_failures;
        }
        if self.history_window == 0 {
            self.history_window = defaults.history_window;
        }
        self
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), String> {
        let path = Self::settings_path().ok_or("Cannot determine config directory")?;
        self.save_to(&path)
    }

    /// Save settings to `path`, creating its directory.
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

    /// Apply environment overrides on top of the stored settings.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (keyed by environment variable name).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PLANNER_BASE_URL") {
            self.planner_base_url = v;
        }
        if let Some(v) = get("PLANNER_API_KEY") {
            self.planner_api_key = v;
        }
        if let Some(v) = get("PLANNER_MODEL") {
            self.planner_model_name = v;
        }
        if let Some(v) = get("PLANNER_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.planner_timeout_secs = v;
        }
        if let Some(v) = get("ADB_DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = get("WAKE_PHRASE") {
            self.wake_phrase = v;
        }
        if let Some(v) = get("WAKE_ACCESS_KEY") {
            self.wake_access_key = v;
        }
        if let Some(v) = get("WAKE_MODEL_PATH") {
            self.wake_model_path = v;
        }
        self
    }

    pub fn device_id(&self) -> Option<String> {
        Some(self.device_id.clone()).filter(|id| !id.is_empty())
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig::default()
            .with_base_url(&self.planner_base_url)
            .with_api_key(&self.planner_api_key)
            .with_model_name(&self.planner_model_name)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
            .with_timeout(self.planner_timeout_secs)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_max_consecutive_failures(self.max_consecutive_failures)
            .with_step_delay(Duration::from_millis(self.step_delay_ms))
            .with_planner_timeout(Duration::from_secs(self.planner_timeout_secs))
            .with_context_window(self.history_window)
    }

    pub fn wake_config(&self) -> WakeConfig {
        WakeConfig::default().with_settle_delay(Duration::from_millis(self.settle_delay_ms))
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        let mut trigger = TriggerConfig::default()
            .with_wake_phrase(&self.wake_phrase)
            .with_fallback_phrases(self.fallback_phrases.iter().cloned());
        if !self.wake_access_key.is_empty() {
            trigger = trigger.with_access_key(&self.wake_access_key);
        }
        if !self.wake_model_path.is_empty() {
            trigger = trigger.with_model_path(&self.wake_model_path);
        }
        trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.device_id = "emulator-5554".to_string();
        settings.wake_phrase = "computer".to_string();
        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn test_load_backfills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"planner_model_name": "", "device_id": "abc", "max_attempts": 0}"#)
            .unwrap();

        let settings = AppSettings::load_from(&path);
        let defaults = AppSettings::default();
        assert_eq!(settings.device_id, "abc");
        assert_eq!(settings.planner_model_name, defaults.planner_model_name);
        assert_eq!(settings.max_attempts, 10);
        assert_eq!(settings.fallback_phrases, defaults.fallback_phrases);
    }

    #[test]
    fn test_missing_or_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());

        fs::write(&path, "{not json").unwrap();
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("PLANNER_MODEL", "gpt-4o"),
            ("PLANNER_TIMEOUT_SECS", "12"),
            ("WAKE_ACCESS_KEY", "secret"),
            ("ADB_DEVICE_ID", "  "),
        ]
        .into_iter()
        .collect();

        let settings =
            AppSettings::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.planner_model_name, "gpt-4o");
        assert_eq!(settings.planner_timeout_secs, 12);
        assert_eq!(settings.device_id(), None);
        assert_eq!(settings.trigger_config().access_key.as_deref(), Some("secret"));
        assert_eq!(settings.loop_config().planner_timeout, Duration::from_secs(12));
    }
}
