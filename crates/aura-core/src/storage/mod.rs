mod config;
pub mod database;
pub mod migrations;

pub use config::{
    EngineConfig, EvaluationConfig, HistoryConfig, PreferencesConfig, PrivacyMode, TasksConfig,
};
pub use database::{
    ContextStore, DataResetOptions, DataResetSummary, GroupShare, HistoryEntry, HistorySummary,
};

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/aura[-dev]/` based on AURA_ENV.
///
/// Set AURA_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("AURA_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("aura-dev")
    } else {
        base_dir.join("aura")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
