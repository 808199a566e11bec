//! Session tuning configuration.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ASEBA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/aseba/config.toml
//!   3. ~/.config/aseba/config.toml
//!
//! A file is never required: `SessionConfig::default()` alone is enough to
//! drive a connection, and most library users will construct it directly
//! rather than go through [`SessionConfig::load`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire;

/// Every tunable of the session engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Node id the host presents as the source of every outbound message.
    pub host_node_id: u16,
    /// Seconds of silence from a node before it is dropped. `None` disables
    /// the liveness check.
    pub liveness_timeout_secs: f64,
    /// Period, in seconds, of each node's variable refresh task.
    pub refresh_rate_secs: f64,
    /// If set, refresh only the span covering these variable names instead
    /// of the whole mirror.
    pub refresh_coverage: Vec<String>,
    /// Period, in seconds, of `LIST_NODES` discovery broadcasts. `0` disables
    /// periodic discovery (a one-shot `list_nodes()` call is still available).
    pub discover_rate_secs: f64,
    /// Timeout, in seconds, for `wait_for_handshake`.
    pub handshake_wait_secs: f64,
    /// Poll interval, in seconds, used while waiting for a handshake.
    pub handshake_poll_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host_node_id: wire::DEFAULT_HOST_NODE_ID,
            liveness_timeout_secs: wire::DEFAULT_LIVENESS_TIMEOUT_SECS,
            refresh_rate_secs: wire::DEFAULT_REFRESH_RATE_SECS,
            refresh_coverage: Vec::new(),
            discover_rate_secs: wire::DEFAULT_DISCOVER_RATE_SECS,
            handshake_wait_secs: wire::DEFAULT_HANDSHAKE_WAIT_SECS,
            handshake_poll_secs: wire::HANDSHAKE_POLL_SECS,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("aseba")
}

fn home_dir() -> PathBuf {
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

impl SessionConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            SessionConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ASEBA_CONFIG")
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
            let text = toml::to_string_pretty(&SessionConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply `ASEBA_*` env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ASEBA_HOST_NODE_ID") {
            if let Ok(n) = v.parse() {
                self.host_node_id = n;
            }
        }
        if let Ok(v) = std::env::var("ASEBA_LIVENESS_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.liveness_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ASEBA_REFRESH_RATE_SECS") {
            if let Ok(n) = v.parse() {
                self.refresh_rate_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ASEBA_DISCOVER_RATE_SECS") {
            if let Ok(n) = v.parse() {
                self.discover_rate_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ASEBA_HANDSHAKE_WAIT_SECS") {
            if let Ok(n) = v.parse() {
                self.handshake_wait_secs = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_wire_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.host_node_id, wire::DEFAULT_HOST_NODE_ID);
        assert_eq!(config.liveness_timeout_secs, wire::DEFAULT_LIVENESS_TIMEOUT_SECS);
        assert!(config.refresh_coverage.is_empty());
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("aseba-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("ASEBA_CONFIG", config_path.to_str().unwrap());
        }

        let path = SessionConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let config = SessionConfig::load().expect("load should succeed");
        assert_eq!(config.host_node_id, wire::DEFAULT_HOST_NODE_ID);

        unsafe {
            std::env::remove_var("ASEBA_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
