//! Configuration system for Lateral.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LATERAL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lateral/config.toml
//!   3. ~/.config/lateral/config.toml

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::attributes::DiscoveryAttributes;
use crate::wire::{
    ADVERTISE_INTERVAL_SECS, DEFAULT_GROUP_ADDR, DEFAULT_GROUP_PORT, DEFAULT_MAX_IDLE_SECS,
    DEFAULT_MULTICAST_TTL,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LateralConfig {
    pub discovery: DiscoveryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// IPv4 multicast group discovery datagrams are sent to.
    pub group_addr: String,
    pub group_port: u16,
    /// Address advertised to peers. Empty = detect the local address.
    pub service_addr: String,
    /// Port the local cache service listens on for lateral connections.
    pub service_port: u16,
    pub advertise_interval_secs: u64,
    /// Silent peers are reaped after this many seconds.
    pub max_idle_secs: u64,
    /// Multicast TTL. 1 = local segment only.
    pub ttl: u32,
    /// IPv4 address of the interface to join the group on. Empty = OS default.
    pub interface: String,
    /// Inbound messages queued for dispatch before the oldest is dropped.
    pub dispatch_queue_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Regions this node advertises to its peers.
    pub regions: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group_addr: DEFAULT_GROUP_ADDR.to_string(),
            group_port: DEFAULT_GROUP_PORT,
            service_addr: String::new(),
            service_port: 1110,
            advertise_interval_secs: ADVERTISE_INTERVAL_SECS,
            max_idle_secs: DEFAULT_MAX_IDLE_SECS,
            ttl: DEFAULT_MULTICAST_TTL,
            interface: String::new(),
            dispatch_queue_size: 64,
        }
    }
}

impl DiscoveryConfig {
    /// Validate and convert into the attributes a discovery service runs with.
    pub fn attributes(&self) -> Result<DiscoveryAttributes, ConfigError> {
        let group_addr: Ipv4Addr = self.group_addr.parse().map_err(|_| {
            ConfigError::InvalidValue("discovery.group_addr", self.group_addr.clone())
        })?;
        if !group_addr.is_multicast() {
            return Err(ConfigError::InvalidValue(
                "discovery.group_addr",
                self.group_addr.clone(),
            ));
        }

        let interface = if self.interface.is_empty() {
            None
        } else {
            Some(self.interface.parse().map_err(|_| {
                ConfigError::InvalidValue("discovery.interface", self.interface.clone())
            })?)
        };

        if self.max_idle_secs == 0 {
            return Err(ConfigError::InvalidValue("discovery.max_idle_secs", "0".into()));
        }
        if self.advertise_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "discovery.advertise_interval_secs",
                "0".into(),
            ));
        }

        Ok(DiscoveryAttributes {
            group_addr,
            group_port: self.group_port,
            service_address: self.service_addr.clone(),
            service_port: self.service_port,
            advertise_interval: Duration::from_secs(self.advertise_interval_secs),
            max_idle_secs: self.max_idle_secs,
            ttl: self.ttl,
            interface,
            dispatch_queue_size: self.dispatch_queue_size.max(1),
        })
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lateral")
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
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LateralConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a config file without env overrides. A missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(LateralConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LATERAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &std::path::Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&LateralConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply LATERAL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LATERAL_DISCOVERY__GROUP_ADDR") {
            self.discovery.group_addr = v;
        }
        if let Some(p) = lookup("LATERAL_DISCOVERY__GROUP_PORT").and_then(|v| v.parse().ok()) {
            self.discovery.group_port = p;
        }
        if let Some(v) = lookup("LATERAL_DISCOVERY__SERVICE_ADDR") {
            self.discovery.service_addr = v;
        }
        if let Some(p) = lookup("LATERAL_DISCOVERY__SERVICE_PORT").and_then(|v| v.parse().ok()) {
            self.discovery.service_port = p;
        }
        if let Some(s) = lookup("LATERAL_DISCOVERY__MAX_IDLE_SECS").and_then(|v| v.parse().ok()) {
            self.discovery.max_idle_secs = s;
        }
        if let Some(v) = lookup("LATERAL_CACHE__REGIONS") {
            self.cache.regions = v
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
    }
}
