//! Station configuration loading and config file resolution
//!
//! Resolution order for the config file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config file (`~/.config/onair/config.toml`, then `/etc/onair/config.toml`)
//! 4. Built-in defaults (no file at all)
//!
//! Individual settings may still be overridden on the command line after loading.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// What the broadcast hub does when a listener's outbox is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Remove the listener session; remaining chunks are never gapped
    #[default]
    Disconnect,
    /// Discard the oldest queued chunk and keep the listener connected
    DropOldest,
}

/// Real-time pacing of queued files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub enabled: bool,
    /// Byte rate used when no duration estimate is available
    pub fallback_bitrate_kbps: u32,
    /// Audio emitted ahead of real time when a file opens
    pub lead_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_bitrate_kbps: 128,
            lead_ms: 2000,
        }
    }
}

/// Duration-derived safety deadline for queued files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub factor: f64,
    pub grace_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            factor: 1.5,
            grace_ms: 10_000,
        }
    }
}

/// Station configuration (TOML)
///
/// Every field has a built-in default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub port: u16,
    pub bind_address: String,
    pub station_name: String,
    pub station_genre: String,
    pub filler_path: PathBuf,
    /// Only files under this directory may be queued
    pub media_dir: PathBuf,
    pub filler_chunk_bytes: usize,
    pub filler_interval_ms: u64,
    pub chunk_bytes: usize,
    pub replay_chunks: usize,
    pub listener_backlog_chunks: usize,
    pub overflow_policy: OverflowPolicy,
    pub delete_played_files: bool,
    pub pacing: PacingConfig,
    pub safety: SafetyConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            station_name: "OnAir".to_string(),
            station_genre: "Various".to_string(),
            filler_path: PathBuf::from("public/static-noise.mp3"),
            media_dir: PathBuf::from("songs"),
            filler_chunk_bytes: 1024,
            filler_interval_ms: 100,
            chunk_bytes: 64 * 1024,
            replay_chunks: 50,
            listener_backlog_chunks: 256,
            overflow_policy: OverflowPolicy::Disconnect,
            delete_played_files: true,
            pacing: PacingConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl StationConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text, path)?;
        config.validate()?;
        info!("Loaded station config from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file and load it, falling back to defaults when none exists
    pub fn resolve(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Self> {
        match resolve_config_path(cli_arg, env_var_name) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.media_dir.as_os_str().is_empty() {
            return Err(Error::Config("media_dir must not be empty".to_string()));
        }
        if self.chunk_bytes == 0 {
            return Err(Error::Config("chunk_bytes must be greater than 0".to_string()));
        }
        if self.filler_chunk_bytes == 0 {
            return Err(Error::Config(
                "filler_chunk_bytes must be greater than 0".to_string(),
            ));
        }
        if self.filler_interval_ms == 0 {
            return Err(Error::Config(
                "filler_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.pacing.enabled && self.pacing.fallback_bitrate_kbps == 0 {
            return Err(Error::Config(
                "pacing.fallback_bitrate_kbps must be greater than 0".to_string(),
            ));
        }
        if !(self.safety.factor.is_finite() && self.safety.factor > 0.0) {
            return Err(Error::Config(format!(
                "safety.factor must be a positive number, got {}",
                self.safety.factor
            )));
        }
        Ok(())
    }

    pub fn filler_interval(&self) -> Duration {
        Duration::from_millis(self.filler_interval_ms)
    }

    pub fn pacing_lead(&self) -> Duration {
        Duration::from_millis(self.pacing.lead_ms)
    }

    pub fn safety_grace(&self) -> Duration {
        Duration::from_millis(self.safety.grace_ms)
    }

    /// Per-listener outbox capacity; always large enough for a full replay flush
    pub fn listener_capacity(&self) -> usize {
        self.replay_chunks + self.listener_backlog_chunks.max(1)
    }
}

/// Find the config file following the resolution order in the module docs
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    default_config_candidates().into_iter().find(|p| p.exists())
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("onair").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/onair/config.toml"));
    }
    candidates
}
