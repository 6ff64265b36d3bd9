use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::config::{ConnectionConfig, paths};
use crate::error::SshError;

/// Resolved authentication for an SSH connection
pub enum ResolvedAuth {
    /// Password authentication with zeroized secret string
    Password(SecretString),
    /// Public key authentication with loaded key
    PublicKey(PrivateKeyWithHashAlg),
    /// SSH agent authentication (keys managed by agent)
    Agent,
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::PublicKey(_) => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
            ResolvedAuth::Agent => f.debug_struct("Agent").finish(),
        }
    }
}

impl ResolvedAuth {
    /// Pick the credential to present for `config`.
    ///
    /// Order: explicit key file, password, SSH agent (when enabled and
    /// reachable), then the first default identity in `~/.ssh`.
    pub async fn resolve(config: &ConnectionConfig) -> Result<Self, SshError> {
        let passphrase = config.passphrase.as_ref().map(|p| p.expose_secret());

        if let Some(key_path) = &config.private_key {
            let expanded_path = paths::expand_tilde(&key_path.to_string_lossy());
            return load_key_file(&expanded_path, passphrase).await;
        }

        if let Some(password) = &config.password {
            return Ok(ResolvedAuth::Password(SecretString::from(
                password.expose_secret().to_string(),
            )));
        }

        if config.agent_enabled() && std::env::var_os("SSH_AUTH_SOCK").is_some() {
            return Ok(ResolvedAuth::Agent);
        }

        match find_default_key() {
            Some(path) => load_key_file(&path, passphrase).await,
            None => Err(SshError::AuthenticationFailed(
                "No password, key file or SSH agent available".to_string(),
            )),
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            ResolvedAuth::Password(_) => "password",
            ResolvedAuth::PublicKey(_) => "publickey",
            ResolvedAuth::Agent => "agent",
        }
    }
}

/// Find the first available default SSH key
fn find_default_key() -> Option<PathBuf> {
    paths::default_identity_files()
        .into_iter()
        .find(|path| path.exists())
}

/// Load an SSH private key from file
async fn load_key_file(path: &Path, passphrase: Option<&str>) -> Result<ResolvedAuth, SshError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SshError::KeyFile(format!("Cannot read key file {}: {}", path.display(), e))
    })?;

    // Check if this is actually a public key (common mistake)
    let first_line = content.lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(SshError::KeyFile(format!(
            "File {} contains a PUBLIC key, not a private key",
            path.display()
        )));
    }

    if !first_line.starts_with("-----BEGIN") {
        return Err(SshError::KeyFile(format!(
            "File {} does not appear to be a valid SSH private key",
            path.display()
        )));
    }

    let key = russh::keys::load_secret_key(path, passphrase).map_err(|e| {
        let normalized = e.to_string().to_lowercase();
        let is_passphrase_error = normalized.contains("encrypted")
            || normalized.contains("passphrase")
            || normalized.contains("cryptographic");
        if is_passphrase_error {
            if passphrase.is_some() {
                SshError::KeyFilePassphraseInvalid(path.to_path_buf())
            } else {
                SshError::KeyFilePassphraseRequired(path.to_path_buf())
            }
        } else {
            SshError::KeyFile(format!("Failed to load key {}: {}", path.display(), e))
        }
    })?;

    // RSA keys sign with SHA-512; other algorithms use their native hash
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };

    Ok(ResolvedAuth::PublicKey(PrivateKeyWithHashAlg::new(
        Arc::new(key),
        hash_alg,
    )))
}
