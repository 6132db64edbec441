//! Configuration system for the relay.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RELAY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/relay/config.toml
//!   3. ~/.config/relay/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub backend: BackendConfig,
    pub checksum: ChecksumConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme and authority of the StreamChat service. The host part also
    /// becomes the `host` header.
    pub origin: String,
    /// Socket address the origin's host is pinned to. Empty = regular DNS.
    pub resolve: String,
    /// Sent as `x-cursor-client-version`.
    pub client_version: String,
    /// Sent as `x-cursor-timezone`.
    pub timezone: String,
    /// Sent as `x-ghost-mode`.
    pub ghost_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    /// Empty = derive locally. `http...` = fetch from this URL.
    /// Anything else is used verbatim as the checksum.
    pub source: String,
    /// Lifetime of a fetched checksum in the cache.
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Proxy URL for all outbound traffic. Empty = direct.
    pub proxy: String,
}

/// Where the checksum comes from when the caller does not supply one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumSource {
    Derived,
    Remote(String),
    Static(String),
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            origin: "https://api2.cursor.sh".into(),
            resolve: "[2606:4700::6812:127d]:443".into(),
            client_version: "0.45.11".into(),
            timezone: "Asia/Shanghai".into(),
            ghost_mode: false,
        }
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            cache_ttl_secs: 30 * 60,
        }
    }
}

// ── Accessors ─────────────────────────────────────────────────────────────────

impl BackendConfig {
    /// Parsed `resolve`, or None when DNS should be used.
    pub fn resolve_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        let raw = self.resolve.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidAddress(raw.to_owned()))
    }
}

impl ChecksumConfig {
    pub fn source(&self) -> ChecksumSource {
        let raw = self.source.trim();
        if raw.is_empty() {
            ChecksumSource::Derived
        } else if raw.starts_with("http") {
            ChecksumSource::Remote(raw.to_owned())
        } else {
            ChecksumSource::Static(raw.to_owned())
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("relay")
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
    #[error("invalid socket address: {0}")]
    InvalidAddress(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RelayConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RELAY_CONFIG")
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
            let text = toml::to_string_pretty(&RelayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RELAY_* overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_BACKEND__ORIGIN") {
            self.backend.origin = v;
        }
        if let Some(v) = lookup("RELAY_BACKEND__RESOLVE") {
            self.backend.resolve = v;
        }
        if let Some(v) = lookup("RELAY_BACKEND__CLIENT_VERSION") {
            self.backend.client_version = v;
        }
        if let Some(v) = lookup("RELAY_CHECKSUM__SOURCE") {
            self.checksum.source = v;
        }
        if let Some(v) = lookup("RELAY_NETWORK__PROXY") {
            self.network.proxy = v;
        }
    }
}
