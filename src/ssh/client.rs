use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config};
use russh::keys::HashAlg;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{ConnectionConfig, SshDefaults, SshHostEntry, paths, ssh_config};
use crate::error::SshError;
use crate::security_log;
use crate::validation;

use super::auth::ResolvedAuth;
use super::handler::{ClientHandler, KnownHostsFiles};
use super::session::{Connector, SshSession};

/// Where and as whom a connection is actually made, after the OpenSSH
/// config and local defaults have been applied.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub config: ConnectionConfig,
}

impl ResolvedTarget {
    /// Fill whatever the caller left unset from `entry`, then from `defaults`.
    pub fn resolve(
        host: &str,
        config: &ConnectionConfig,
        entry: Option<&SshHostEntry>,
        defaults: &SshDefaults,
    ) -> Self {
        let mut config = config.clone();

        let hostname = entry
            .and_then(|e| e.hostname.clone())
            .unwrap_or_else(|| host.to_string());
        let port = config
            .port
            .or_else(|| entry.and_then(|e| e.port))
            .unwrap_or_else(|| config.port_or_default());

        let explicit_user = config
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let username = explicit_user
            .or_else(|| entry.and_then(|e| e.user.clone()))
            .or_else(|| defaults.default_username.clone())
            .unwrap_or_else(|| config.username_or_default());

        if config.private_key.is_none() && config.password.is_none() {
            config.private_key = entry.and_then(SshHostEntry::existing_identity_file);
        }

        config.port = Some(port);
        config.username = Some(username.clone());

        Self {
            hostname,
            port,
            username,
            config,
        }
    }

    pub fn addr(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// SSH client for establishing connections
pub struct SshClient {
    config: Arc<Config>,
    defaults: SshDefaults,
    known_hosts: KnownHostsFiles,
}

impl SshClient {
    pub fn new(defaults: SshDefaults) -> Self {
        let known_hosts = KnownHostsFiles {
            primary: paths::known_hosts_file(),
            openssh: paths::ssh_known_hosts_file(),
        };
        Self::with_known_hosts(defaults, known_hosts)
    }

    pub fn with_known_hosts(defaults: SshDefaults, known_hosts: KnownHostsFiles) -> Self {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        let keepalive = if defaults.keepalive_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(defaults.keepalive_interval_secs))
        };

        let config = Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: keepalive,
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            defaults,
            known_hosts,
        }
    }

    fn resolve_target(&self, host: &str, config: &ConnectionConfig) -> ResolvedTarget {
        let entry = if config.wants_ssh_config() {
            match ssh_config::load_for_host(config.config_file.as_deref(), host) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Ignoring SSH config for {}: {}", host, e);
                    None
                }
            }
        } else {
            None
        };

        if entry.is_some() {
            tracing::debug!("Applying SSH config entry for {}", host);
        }

        ResolvedTarget::resolve(host, config, entry.as_ref(), &self.defaults)
    }

    /// Open, verify and authenticate a session to `host`.
    pub async fn connect(
        &self,
        host: &str,
        config: &ConnectionConfig,
    ) -> Result<SshSession, SshError> {
        validation::validate_target(host, config)
            .map_err(|e| SshError::InvalidTarget(e.to_string()))?;

        let target = self.resolve_target(host, config);
        let addr = target.addr();
        let connection_timeout = self.defaults.connection_timeout();

        // Connect with timeout
        let stream = timeout(connection_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SshError::Timeout(addr.clone()))?
            .map_err(|e| SshError::ConnectionFailed {
                host: target.hostname.clone(),
                port: target.port,
                reason: e.to_string(),
            })?;

        match timeout(connection_timeout, self.establish_session(&target, stream)).await {
            Ok(result) => result,
            Err(_) => Err(SshError::Timeout(addr)),
        }
    }

    async fn establish_session(
        &self,
        target: &ResolvedTarget,
        stream: TcpStream,
    ) -> Result<SshSession, SshError> {
        let handler = ClientHandler::new(
            target.hostname.clone(),
            target.port,
            self.defaults.host_key_policy,
            self.known_hosts.clone(),
        );

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| match e {
                SshError::HostKeyVerification(_) => e,
                other => SshError::ConnectionFailed {
                    host: target.hostname.clone(),
                    port: target.port,
                    reason: other.to_string(),
                },
            })?;

        let auth = ResolvedAuth::resolve(&target.config).await?;
        self.authenticate(&mut handle, &target.username, auth, &target.hostname, target.port)
            .await?;

        tracing::info!(
            "SSH session established to {}@{}:{}",
            target.username,
            target.hostname,
            target.port
        );

        Ok(SshSession::new(handle, &target.hostname, target.port, &target.username))
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        username: &str,
        auth: ResolvedAuth,
        hostname: &str,
        port: u16,
    ) -> Result<(), SshError> {
        let method_name = auth.method_name();
        security_log::log_auth_attempt(hostname, port, username, method_name);

        let auth_result = match auth {
            ResolvedAuth::Password(password) => {
                // Use expose_secret() only at the point of authentication
                handle
                    .authenticate_password(username, password.expose_secret())
                    .await
            }
            ResolvedAuth::PublicKey(key) => handle.authenticate_publickey(username, key).await,
            ResolvedAuth::Agent => {
                return match self.authenticate_with_agent(handle, username).await {
                    Ok(()) => {
                        security_log::log_auth_success(hostname, port, username, method_name);
                        Ok(())
                    }
                    Err(e) => {
                        security_log::log_auth_failure(
                            hostname,
                            port,
                            username,
                            method_name,
                            &e.to_string(),
                        );
                        Err(e)
                    }
                };
            }
        };

        let auth_result = match auth_result {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                security_log::log_auth_failure(hostname, port, username, method_name, &reason);
                return Err(SshError::AuthenticationFailed(reason));
            }
        };

        if !auth_result.success() {
            let reason = "Authentication rejected by server";
            security_log::log_auth_failure(hostname, port, username, method_name, reason);
            return Err(SshError::AuthenticationFailed(reason.to_string()));
        }

        security_log::log_auth_success(hostname, port, username, method_name);
        Ok(())
    }

    async fn authenticate_with_agent(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        username: &str,
    ) -> Result<(), SshError> {
        let agent_path = std::env::var("SSH_AUTH_SOCK").map_err(|_| {
            SshError::Agent("SSH_AUTH_SOCK not set - is ssh-agent running?".to_string())
        })?;

        let stream = tokio::net::UnixStream::connect(&agent_path)
            .await
            .map_err(|e| SshError::Agent(format!("Failed to connect to SSH agent: {}", e)))?;

        let mut agent = russh::keys::agent::client::AgentClient::connect(stream);

        let identities = agent
            .request_identities()
            .await
            .map_err(|e| SshError::Agent(format!("Failed to get identities: {}", e)))?;

        if identities.is_empty() {
            return Err(SshError::Agent(
                "No identities found in SSH agent".to_string(),
            ));
        }

        // Try each identity with SHA-512 for RSA keys
        for identity in identities {
            let hash_alg = if identity.algorithm().is_rsa() {
                Some(HashAlg::Sha512)
            } else {
                None
            };

            match handle
                .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => return Ok(()),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Agent key failed: {}", e);
                    continue;
                }
            }
        }

        Err(SshError::Agent(
            "No agent key accepted by server".to_string(),
        ))
    }
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new(SshDefaults::default())
    }
}

impl Connector for SshClient {
    type Session = SshSession;

    async fn connect(&self, host: &str, config: &ConnectionConfig) -> Result<SshSession, SshError> {
        SshClient::connect(self, host, config).await
    }
}
