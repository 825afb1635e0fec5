//! Configuration file support for Quay.
//!
//! Quay supports two configuration file locations:
//! - Global: `~/.quay/config.toml` - User-wide defaults
//! - Project: `.quay/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.
//!
//! ```toml
//! [net]
//! offline = false
//! timeout_secs = 30
//! jobs = 8
//!
//! [cache]
//! verify_on_lookup = true
//!
//! [registries.opam]
//! index = "https://example.com/opam-index"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default network timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Quay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub net: NetConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Named registries
    pub registries: BTreeMap<String, RegistryConfig>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Offline mode (don't fetch from network)
    pub offline: bool,

    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,

    /// User agent sent with downloads
    pub user_agent: Option<String>,

    /// Number of parallel fetches
    pub jobs: Option<usize>,
}

/// Cache-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Re-hash published entries every time they are looked up
    pub verify_on_lookup: bool,
}

/// A registry index location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL (http, https or file) or local path of the shim index
    pub index: String,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Net settings
        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.timeout_secs.is_some() {
            self.net.timeout_secs = other.net.timeout_secs;
        }
        if other.net.user_agent.is_some() {
            self.net.user_agent = other.net.user_agent;
        }
        if other.net.jobs.is_some() {
            self.net.jobs = other.net.jobs;
        }

        // Cache settings
        if other.cache.verify_on_lookup {
            self.cache.verify_on_lookup = true;
        }

        // Registries merge by name
        self.registries.extend(other.registries);
    }

    /// Network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.net.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// User agent for HTTP downloads.
    pub fn user_agent(&self) -> String {
        self.net
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("quay/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Number of parallel fetches (0 lets the pool decide).
    pub fn jobs(&self) -> usize {
        self.net.jobs.unwrap_or(0)
    }

    /// Look up a registry by name.
    pub fn registry(&self, name: &str) -> Option<&RegistryConfig> {
        self.registries.get(name)
    }

    /// Add or replace a registry.
    pub fn with_registry(mut self, name: impl Into<String>, index: impl Into<String>) -> Self {
        self.registries.insert(
            name.into(),
            RegistryConfig {
                index: index.into(),
            },
        );
        self
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.quay/config.toml)
/// 2. Global config (~/.quay/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    // Project config overrides global
    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Path to the project config file under a project root.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".quay").join("config.toml")
}
