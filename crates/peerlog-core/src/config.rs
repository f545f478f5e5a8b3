//! Configuration for peerlog.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PEERLOG_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/peerlog/config.toml
//!   3. ~/.config/peerlog/config.toml
//!
//! Overrides: `PEERLOG_REGISTRY__MAX_SLOTS`, `PEERLOG_LOGGING__ENABLED`,
//! `PEERLOG_LOGGING__DIRECTORY`, `PEERLOG_LOGGING__FLUSH_EVERY`,
//! `PEERLOG_LOGGING__LOG_INBOUND`, `PEERLOG_LOGGING__LOG_OUTBOUND`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerlogConfig {
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Connection slots in the pool. Slots are `0..max_slots`.
    pub max_slots: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Start a packet log file at startup.
    pub enabled: bool,
    /// Directory that receives packet log files.
    pub directory: PathBuf,
    /// File names are `<filename_prefix>-<unix_ms>-<seq>.log`.
    pub filename_prefix: String,
    /// Flush after this many lines. 1 = every line.
    pub flush_every: u32,
    /// Recently logged records kept in memory. 0 = none.
    pub ring_capacity: usize,
    /// Prepended / appended to every logged line.
    pub line_prefix: String,
    pub line_suffix: String,
    pub log_inbound: bool,
    pub log_outbound: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_slots: 64 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: data_dir().join("logs"),
            filename_prefix: "packets".to_string(),
            flush_every: 1,
            ring_capacity: 64,
            line_prefix: String::new(),
            line_suffix: String::new(),
            log_inbound: true,
            log_outbound: true,
        }
    }
}

impl LoggingConfig {
    /// Full path prefix handed to the file sink.
    pub fn file_prefix(&self) -> PathBuf {
        self.directory.join(&self.filename_prefix)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("peerlog")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("peerlog")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PeerlogConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            PeerlogConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PEERLOG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PeerlogConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `PEERLOG_<SECTION>__<FIELD>` overrides from `lookup`.
    /// Values that do not parse, and a zero slot or flush count, are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| lookup(key).map(|v| matches!(v.as_str(), "true" | "1"));

        if let Some(on) = flag("PEERLOG_LOGGING__ENABLED") {
            self.logging.enabled = on;
        }
        if let Some(on) = flag("PEERLOG_LOGGING__LOG_INBOUND") {
            self.logging.log_inbound = on;
        }
        if let Some(on) = flag("PEERLOG_LOGGING__LOG_OUTBOUND") {
            self.logging.log_outbound = on;
        }
        if let Some(v) = lookup("PEERLOG_LOGGING__DIRECTORY") {
            self.logging.directory = PathBuf::from(v);
        }
        if let Some(n) = lookup("PEERLOG_LOGGING__FLUSH_EVERY").and_then(|v| v.parse::<u32>().ok()) {
            if n > 0 {
                self.logging.flush_every = n;
            }
        }
        if let Some(n) = lookup("PEERLOG_REGISTRY__MAX_SLOTS").and_then(|v| v.parse::<u16>().ok()) {
            if n > 0 {
                self.registry.max_slots = n;
            }
        }
    }
}
