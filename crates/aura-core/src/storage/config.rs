//! TOML-based engine configuration.
//!
//! Stores user-tunable knobs:
//! - Evaluation parameters (place radius, staleness threshold)
//! - History retention policy
//! - Background task cadence and budgets
//! - Privacy mode for persisted location detail
//! - Sensing preferences (per-subsystem opt-outs)
//!
//! Configuration is stored at `~/.config/aura/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, Result};

/// How much location detail reaches disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    /// Persist precise coordinates alongside labels.
    Full,
    /// Persist labels only; coordinates are stripped before any write.
    Minimal,
}

impl PrivacyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PrivacyMode::Full => "full",
            PrivacyMode::Minimal => "minimal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(PrivacyMode::Full),
            "minimal" => Some(PrivacyMode::Minimal),
            _ => None,
        }
    }
}

/// Evaluation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Radius for matching a fix against a saved place, in meters.
    #[serde(default = "default_place_radius_m")]
    pub place_radius_m: f64,
    /// Snapshot age beyond which the watchdog forces a re-evaluation.
    #[serde(default = "default_staleness_secs")]
    pub staleness_threshold_secs: u64,
}

impl EvaluationConfig {
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_threshold_secs.min(i64::MAX as u64) as i64)
    }
}

/// Retention policy for the context history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Explicit entry cap; when unset, derived from `max_age_days`.
    #[serde(default)]
    pub max_entries: Option<u32>,
}

// Expected steady-state write rate used to derive the entry cap.
const ENTRIES_PER_DAY: u32 = 120;

impl HistoryConfig {
    /// The entry cap actually enforced by pruning.
    pub fn effective_max_entries(&self) -> u32 {
        match self.max_entries {
            Some(n) => n.max(1),
            None => self.max_age_days.max(1).saturating_mul(ENTRIES_PER_DAY),
        }
    }
}

/// Background task cadence and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_fetch_interval_secs")]
    pub periodic_fetch_interval_secs: u64,
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    /// Minimum spacing between watchdog inspections.
    #[serde(default = "default_watchdog_debounce_secs")]
    pub watchdog_debounce_secs: u64,
    /// Hard wall-clock budget for one evaluation cycle.
    #[serde(default = "default_cycle_budget_ms")]
    pub cycle_budget_ms: u64,
    /// Movement below this displacement does not wake the location task.
    #[serde(default = "default_min_displacement_m")]
    pub min_displacement_m: f64,
}

/// Per-subsystem opt-outs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Master switch for the whole sensing subsystem. When off, the
    /// watchdog skips inspections entirely.
    #[serde(default = "default_true")]
    pub context_sensing: bool,
    #[serde(default = "default_true")]
    pub background_location: bool,
    #[serde(default = "default_true")]
    pub periodic_fetch: bool,
    #[serde(default = "default_true")]
    pub sleep_tracking: bool,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/aura/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default = "default_privacy_mode")]
    pub privacy_mode: PrivacyMode,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

// Default functions
fn default_place_radius_m() -> f64 {
    150.0
}
fn default_staleness_secs() -> u64 {
    480
}
fn default_max_age_days() -> u32 {
    14
}
fn default_fetch_interval_secs() -> u64 {
    900
}
fn default_watchdog_interval_secs() -> u64 {
    120
}
fn default_watchdog_debounce_secs() -> u64 {
    30
}
fn default_cycle_budget_ms() -> u64 {
    5_000
}
fn default_min_displacement_m() -> f64 {
    50.0
}
fn default_true() -> bool {
    true
}
fn default_privacy_mode() -> PrivacyMode {
    PrivacyMode::Full
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            place_radius_m: default_place_radius_m(),
            staleness_threshold_secs: default_staleness_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_entries: None,
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            periodic_fetch_interval_secs: default_fetch_interval_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            watchdog_debounce_secs: default_watchdog_debounce_secs(),
            cycle_budget_ms: default_cycle_budget_ms(),
            min_displacement_m: default_min_displacement_m(),
        }
    }
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            context_sensing: true,
            background_location: true,
            periodic_fetch: true,
            sleep_tracking: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationConfig::default(),
            history: HistoryConfig::default(),
            tasks: TasksConfig::default(),
            privacy_mode: PrivacyMode::Full,
            preferences: PreferencesConfig::default(),
        }
    }
}

impl EngineConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".to_string(),
        };
        let unparsable = |what: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse '{value}' as {what}"),
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|_| unparsable("bool"))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| unparsable("number"))?
                        } else {
                            return Err(unparsable("number"));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|_| unparsable("json"))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: EngineConfig = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist. Fails on unknown keys so
    /// typos never silently create dead settings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
