//! Engine configuration
//!
//! Stored as JSON in the user's config directory.
//! Default location: ~/.config/fretlab/config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::shared::{DEFAULT_BARS, DEFAULT_BEATS_PER_BAR, DEFAULT_BPM};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often the scheduler wakes up, in milliseconds
    pub schedule_interval_ms: u64,
    /// How far ahead of the clock each wake schedules, in milliseconds
    pub lookahead_ms: u64,
    /// How far ahead the looper queues its next cycle, in milliseconds
    pub loop_lookahead_ms: u64,
    /// Capacity of the control → engine command queue
    pub command_queue: usize,
    /// Initial master volume (0..1)
    pub master_volume: f32,
    /// Tempo used until a session says otherwise
    pub default_bpm: f64,
    pub default_bars: u32,
    pub default_beats_per_bar: u32,
    /// Timbre used when a caller doesn't name one
    pub default_timbre: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule_interval_ms: 25,
            lookahead_ms: 100,
            loop_lookahead_ms: 100,
            command_queue: 1024,
            master_volume: crate::audio::mix_bus::DEFAULT_MASTER_VOLUME,
            default_bpm: DEFAULT_BPM,
            default_bars: DEFAULT_BARS,
            default_beats_per_bar: DEFAULT_BEATS_PER_BAR,
            default_timbre: crate::synth::DEFAULT_TIMBRE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn loop_lookahead_secs(&self) -> f64 {
        self.loop_lookahead_ms as f64 / 1000.0
    }

    pub fn schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.schedule_interval_ms.max(1))
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/fretlab/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("fretlab")
        .join("config.json")
}

/// Load configuration from a JSON file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> EngineConfig {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return EngineConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                EngineConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            EngineConfig::default()
        }
    }
}

/// Save configuration, creating the parent directory if needed
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write config to {:?}", path))?;
    log::info!("save_config: Saved to {:?}", path);
    Ok(())
}
