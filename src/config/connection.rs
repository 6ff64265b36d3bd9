//! Per-request connection parameters.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Authentication material and optional overrides for one target host.
///
/// The host itself is passed separately to the pool so the same config can be
/// reused across hosts.
#[derive(Debug, Default)]
pub struct ConnectionConfig {
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<SecretString>,
    /// Fall back to the SSH agent when neither password nor key is set.
    /// Defaults to enabled.
    pub use_agent: Option<bool>,
    /// OpenSSH client config to consult instead of `~/.ssh/config`
    pub config_file: Option<PathBuf>,
}

impl Clone for ConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            port: self.port,
            username: self.username.clone(),
            password: self.password.as_ref().map(clone_secret),
            private_key: self.private_key.clone(),
            passphrase: self.passphrase.as_ref().map(clone_secret),
            use_agent: self.use_agent,
            config_file: self.config_file.clone(),
        }
    }
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

impl ConnectionConfig {
    pub fn with_password(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(SecretString::from(password.to_string())),
            ..Self::default()
        }
    }

    pub fn with_private_key(username: &str, key_path: impl Into<PathBuf>) -> Self {
        Self {
            username: Some(username.to_string()),
            private_key: Some(key_path.into()),
            ..Self::default()
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    /// The configured username, else the local login name
    pub fn username_or_default(&self) -> String {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(local_username)
    }

    pub fn agent_enabled(&self) -> bool {
        self.use_agent.unwrap_or(true)
    }

    /// Whether the OpenSSH client config should be consulted for this target
    pub fn wants_ssh_config(&self) -> bool {
        self.config_file.is_some() || (self.private_key.is_none() && self.password.is_none())
    }
}

/// Local login name, used when no username is configured
pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
