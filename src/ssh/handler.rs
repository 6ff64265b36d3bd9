use std::future::Future;
use std::path::PathBuf;

use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey};

use crate::config::HostKeyPolicy;
use crate::error::SshError;
use crate::security_log;

/// Known-hosts files consulted during server key verification.
#[derive(Debug, Clone, Default)]
pub struct KnownHostsFiles {
    /// hostlink's own file; new keys are learned here
    pub primary: Option<PathBuf>,
    /// The user's OpenSSH file, read only
    pub openssh: Option<PathBuf>,
}

impl KnownHostsFiles {
    fn readable(&self) -> impl Iterator<Item = &PathBuf> {
        self.primary
            .iter()
            .chain(self.openssh.iter().filter(|p| Some(*p) != self.primary.as_ref()))
            .filter(|p| p.exists())
    }
}

/// Outcome of looking a server key up in the known-hosts files
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyLookup {
    Known,
    Unknown,
    Mismatch(String),
}

/// SSH client handler implementation
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: KnownHostsFiles,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, policy: HostKeyPolicy, known_hosts: KnownHostsFiles) -> Self {
        Self {
            host,
            port,
            policy,
            known_hosts,
        }
    }

    fn lookup(&self, key: &PublicKey) -> KeyLookup {
        for path in self.known_hosts.readable() {
            match russh::keys::known_hosts::check_known_hosts_path(&self.host, self.port, key, path) {
                Ok(true) => return KeyLookup::Known,
                Ok(false) => {}
                Err(e) => return KeyLookup::Mismatch(format!("{} ({})", e, path.display())),
            }
        }
        KeyLookup::Unknown
    }

    fn learn(&self, key: &PublicKey) -> Result<(), SshError> {
        let Some(path) = &self.known_hosts.primary else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SshError::HostKeyVerification(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }
        russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path)
            .map_err(|e| SshError::HostKeyVerification(format!("Failed to store host key: {}", e)))
    }

    fn verify(&self, key: &PublicKey) -> Result<bool, SshError> {
        if self.policy == HostKeyPolicy::AcceptAll {
            return Ok(true);
        }

        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();
        match self.lookup(key) {
            KeyLookup::Known => {
                tracing::debug!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            KeyLookup::Mismatch(detail) => {
                tracing::warn!(
                    "HOST KEY MISMATCH for {}:{} - {} ({})",
                    self.host,
                    self.port,
                    fingerprint,
                    detail
                );
                security_log::log_host_key_rejected(&self.host, self.port, "key changed");
                Err(SshError::HostKeyVerification(format!(
                    "Host key for {}:{} does not match known_hosts: {}",
                    self.host, self.port, detail
                )))
            }
            KeyLookup::Unknown if self.policy == HostKeyPolicy::Strict => {
                security_log::log_host_key_rejected(&self.host, self.port, "unknown host");
                Err(SshError::HostKeyVerification(format!(
                    "Unknown host {}:{} ({}) and strict host key checking is enabled",
                    self.host, self.port, fingerprint
                )))
            }
            KeyLookup::Unknown => {
                self.learn(key)?;
                security_log::log_host_key_learned(&self.host, self.port, &fingerprint);
                Ok(true)
            }
        }
    }
}

impl Handler for ClientHandler {
    type Error = SshError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let result = self.verify(server_public_key);
        async move { result }
    }
}
