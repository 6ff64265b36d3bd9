use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Application-wide settings stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ssh: SshDefaults,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl AppConfig {
    /// Load from the default location, creating it with defaults if missing
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::paths::config_file().ok_or_else(|| ConfigError::ReadFile {
            path: PathBuf::from("config.toml"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config file path",
            ),
        })?;

        if !path.exists() {
            let config = Self::default();
            super::paths::ensure_config_dir().map_err(ConfigError::CreateDir)?;
            config.save_to(&path)?;
            return Ok(config);
        }

        Self::load_from(&path)
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_keepalive() -> u64 {
    60
}

/// How unknown or changed server host keys are handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Only hosts already present in a known_hosts file are accepted
    Strict,
    /// Unknown hosts are learned on first contact, changed keys are rejected
    #[default]
    AcceptNew,
    /// Every host key is accepted
    AcceptAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshDefaults {
    #[serde(default = "default_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default)]
    pub default_username: Option<String>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

impl SshDefaults {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_timeout(),
            keepalive_interval_secs: default_keepalive(),
            default_username: None,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_health_check_timeout() -> u64 {
    5
}

fn default_os_cache_ttl() -> u64 {
    3600
}

/// Connection pool tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Entries unused for longer than this are reaped by the sweeper
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Upper bound for the liveness probe run before a pooled session is reused
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_secs: u64,
    /// How long an OS classification stays valid for a host
    #[serde(default = "default_os_cache_ttl")]
    pub os_cache_ttl_secs: u64,
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn os_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.os_cache_ttl_secs)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            health_check_timeout_secs: default_health_check_timeout(),
            os_cache_ttl_secs: default_os_cache_ttl(),
        }
    }
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

/// Caller-side reconnect policy. The pool never retries on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}
