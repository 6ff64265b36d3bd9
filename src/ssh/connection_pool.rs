//! Reusable SSH sessions keyed by target and credential.
//!
//! Each key maps to at most one live session together with the host's OS
//! classification. Callers for the same key are serialised by a per-key gate
//! so a burst of requests produces a single connection attempt. A background
//! sweeper reaps idle or dropped sessions; the liveness probe run on every
//! reuse is what actually guards callers against dead sessions.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionConfig, PoolSettings};
use crate::error::SshError;
use crate::security_log;

use super::liveness;
use super::os_detect::{OsClassification, OsDetector, OsFamily, ShellDialect};
use super::session::{Connector, RemoteSession};

/// Which credential a pooled session was authenticated with
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum CredentialId {
    KeyPath(PathBuf),
    /// SHA-256 of the password
    Password([u8; 32]),
    Agent,
}

impl std::fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialId::KeyPath(path) => f.debug_tuple("KeyPath").field(path).finish(),
            CredentialId::Password(_) => f.debug_tuple("Password").field(&"[DIGEST]").finish(),
            CredentialId::Agent => f.write_str("Agent"),
        }
    }
}

impl CredentialId {
    fn from_config(config: &ConnectionConfig) -> Self {
        if let Some(path) = &config.private_key {
            return CredentialId::KeyPath(path.clone());
        }
        if let Some(password) = &config.password {
            let digest = Sha256::digest(password.expose_secret().as_bytes());
            return CredentialId::Password(digest.into());
        }
        CredentialId::Agent
    }
}

#[derive(Clone, Debug, Eq)]
pub struct ConnectionKey {
    pub host: Arc<str>,
    pub port: u16,
    pub username: Arc<str>,
    pub credential: CredentialId,
}

impl PartialEq for ConnectionKey {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port
            && self.host.as_ref() == other.host.as_ref()
            && self.username.as_ref() == other.username.as_ref()
            && self.credential == other.credential
    }
}

impl Hash for ConnectionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.as_ref().hash(state);
        self.port.hash(state);
        self.username.as_ref().hash(state);
        self.credential.hash(state);
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

impl ConnectionKey {
    pub fn derive(host: &str, config: &ConnectionConfig) -> Self {
        Self {
            host: Arc::from(host),
            port: config.port_or_default(),
            username: Arc::from(config.username_or_default()),
            credential: CredentialId::from_config(config),
        }
    }
}

struct PooledEntry<S> {
    session: Arc<S>,
    last_used: Instant,
    last_used_at: DateTime<Utc>,
    host: String,
    username: String,
    os_info: Option<OsClassification>,
}

impl<S> PooledEntry<S> {
    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.last_used_at = Utc::now();
    }
}

/// Snapshot of one pooled session
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub host: String,
    /// The user the session authenticated as, which may come from
    /// `~/.ssh/config` rather than the request
    pub username: String,
    pub last_used: DateTime<Utc>,
    pub idle_secs: u64,
    pub is_connected: bool,
    pub os_family: Option<OsFamily>,
    pub shell: Option<ShellDialect>,
}

/// Snapshot of the whole pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total_connections: usize,
    pub active_connections: usize,
    pub connections: Vec<ConnectionSummary>,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

struct PoolShared<C: Connector> {
    connector: C,
    detector: OsDetector,
    settings: PoolSettings,
    entries: Mutex<HashMap<ConnectionKey, PooledEntry<C::Session>>>,
    gates: Mutex<HashMap<ConnectionKey, Gate>>,
}

impl<C: Connector> PoolShared<C> {
    fn gate(&self, key: &ConnectionKey) -> Gate {
        self.gates.lock().entry(key.clone()).or_default().clone()
    }

    /// Drop gates nobody is waiting on
    fn prune_gates(&self) {
        self.gates.lock().retain(|_, gate| Arc::strong_count(gate) > 1);
    }

    fn existing(&self, key: &ConnectionKey) -> Option<Arc<C::Session>> {
        self.entries.lock().get(key).map(|entry| entry.session.clone())
    }

    /// Refresh `last_used` if `session` is still the pooled one for `key`
    fn touch(&self, key: &ConnectionKey, session: &Arc<C::Session>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if Arc::ptr_eq(&entry.session, session) => {
                entry.touch();
                true
            }
            _ => false,
        }
    }

    async fn evict_if_matches(&self, key: &ConnectionKey, session: &Arc<C::Session>, reason: &str) {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if Arc::ptr_eq(&entry.session, session) => entries.remove(key),
                _ => None,
            }
        };
        if let Some(entry) = removed {
            security_log::log_connection_evicted(&entry.host, &entry.username, reason);
        }
        if let Err(e) = session.disconnect().await {
            tracing::debug!("Error disconnecting {}: {}", key, e);
        }
    }

    /// Evict sessions idle past the threshold or no longer connected.
    async fn reap_idle(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout();
        let expired: Vec<(PooledEntry<C::Session>, &'static str)> = {
            let mut entries = self.entries.lock();
            let doomed: Vec<(ConnectionKey, &'static str)> = entries
                .iter()
                .filter_map(|(key, entry)| {
                    if !entry.session.is_connected() {
                        Some((key.clone(), "disconnected"))
                    } else if entry.last_used.elapsed() > idle_timeout {
                        Some((key.clone(), "idle"))
                    } else {
                        None
                    }
                })
                .collect();
            doomed
                .into_iter()
                .filter_map(|(key, reason)| entries.remove(&key).map(|entry| (entry, reason)))
                .collect()
        };

        for (entry, reason) in &expired {
            tracing::info!(
                "Removing {} connection to {}@{}",
                reason,
                entry.username,
                entry.host
            );
            security_log::log_connection_evicted(&entry.host, &entry.username, reason);
            if let Err(e) = entry.session.disconnect().await {
                tracing::debug!("Error disconnecting {}: {}", entry.host, e);
            }
        }

        self.prune_gates();
        expired.len()
    }
}

/// Pool of live sessions produced by a [`Connector`].
///
/// Must be created inside a Tokio runtime; the idle sweeper is spawned on it.
pub struct ConnectionPool<C: Connector> {
    shared: Arc<PoolShared<C>>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, settings: PoolSettings) -> Self {
        let shared = Arc::new(PoolShared {
            connector,
            detector: OsDetector::new(settings.os_cache_ttl()),
            settings,
            entries: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        });
        let shutdown = CancellationToken::new();
        let sweeper = spawn_sweeper(
            Arc::downgrade(&shared),
            shared.settings.sweep_interval(),
            shutdown.clone(),
        );

        Self {
            shared,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn os_detector(&self) -> &OsDetector {
        &self.shared.detector
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.shared.settings
    }

    /// Return a live session for `host`, reusing the pooled one when it
    /// passes the liveness probe.
    ///
    /// Connection failures are returned as is and leave nothing behind.
    pub async fn get_connection(
        &self,
        host: &str,
        config: &ConnectionConfig,
    ) -> Result<Arc<C::Session>, SshError> {
        let key = ConnectionKey::derive(host, config);
        let gate = self.shared.gate(&key);
        let _serialized = gate.lock().await;

        if let Some(session) = self.shared.existing(&key) {
            let healthy =
                liveness::is_alive(session.as_ref(), self.shared.settings.health_check_timeout())
                    .await;
            if healthy && self.shared.touch(&key, &session) {
                tracing::info!("Reusing SSH connection to {}", key);
                return Ok(session);
            }
            tracing::info!("Connection to {} failed health check, creating new one", key);
            self.shared
                .evict_if_matches(&key, &session, "failed health check")
                .await;
        }

        tracing::info!("Creating new SSH connection to {}", key);
        let session = match self.shared.connector.connect(host, config).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                tracing::error!("Failed to create SSH connection to {}: {}", key, e);
                return Err(e);
            }
        };

        let os_info = self.shared.detector.detect(session.as_ref(), host).await;
        tracing::info!(
            "Connected to {} ({} {}, {} shell)",
            key,
            os_info.family,
            os_info.version,
            os_info.shell
        );

        let username = session
            .authenticated_user()
            .map(str::to_string)
            .unwrap_or_else(|| key.username.to_string());
        security_log::log_connection_pooled(host, &username);
        self.shared.entries.lock().insert(
            key.clone(),
            PooledEntry {
                session: session.clone(),
                last_used: Instant::now(),
                last_used_at: Utc::now(),
                host: host.to_string(),
                username,
                os_info: Some(os_info),
            },
        );

        Ok(session)
    }

    /// Disconnect and forget the pooled session for `host`.
    ///
    /// Returns whether a session was pooled. The entry is gone even when the
    /// disconnect itself fails.
    pub async fn remove_connection(
        &self,
        host: &str,
        config: &ConnectionConfig,
    ) -> Result<bool, SshError> {
        let key = ConnectionKey::derive(host, config);
        let gate = self.shared.gate(&key);
        let _serialized = gate.lock().await;

        let removed = self.shared.entries.lock().remove(&key);
        let Some(entry) = removed else {
            return Ok(false);
        };

        tracing::info!("Removed SSH connection to {}", key);
        security_log::log_connection_evicted(&entry.host, &entry.username, "removed");
        entry.session.disconnect().await?;
        Ok(true)
    }

    /// [`Self::remove_connection`] for callers that do not care about the outcome
    pub async fn disconnect(&self, host: &str, config: &ConnectionConfig) {
        if let Err(e) = self.remove_connection(host, config).await {
            tracing::warn!("Error disconnecting from {}: {}", host, e);
        }
    }

    /// OS classification stored with the pooled session for `host`
    pub fn os_info(&self, host: &str, config: &ConnectionConfig) -> Option<OsClassification> {
        let key = ConnectionKey::derive(host, config);
        self.shared
            .entries
            .lock()
            .get(&key)
            .and_then(|entry| entry.os_info.clone())
    }

    pub fn pool_status(&self) -> PoolStatus {
        let entries = self.shared.entries.lock();
        let connections: Vec<ConnectionSummary> = entries
            .values()
            .map(|entry| ConnectionSummary {
                host: entry.host.clone(),
                username: entry.username.clone(),
                last_used: entry.last_used_at,
                idle_secs: entry.last_used.elapsed().as_secs(),
                is_connected: entry.session.is_connected(),
                os_family: entry.os_info.as_ref().map(|os| os.family),
                shell: entry.os_info.as_ref().map(|os| os.shell),
            })
            .collect();

        PoolStatus {
            total_connections: connections.len(),
            active_connections: connections.iter().filter(|c| c.is_connected).count(),
            connections,
        }
    }

    /// Run one idle sweep now. Returns the number of sessions evicted.
    pub async fn reap_idle(&self) -> usize {
        self.shared.reap_idle().await
    }

    /// Stop the sweeper and disconnect every pooled session.
    ///
    /// Safe to call more than once.
    pub async fn close_all(&self) {
        self.shutdown.cancel();
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::debug!("Sweeper task ended abnormally: {}", e);
            }
        }

        let drained: Vec<PooledEntry<C::Session>> = {
            let mut entries = self.shared.entries.lock();
            entries.drain().map(|(_, entry)| entry).collect()
        };
        if drained.is_empty() {
            return;
        }

        tracing::info!("Closing {} SSH connections", drained.len());
        let results = futures::future::join_all(drained.iter().map(|entry| async move {
            security_log::log_connection_evicted(&entry.host, &entry.username, "shutdown");
            (entry.host.as_str(), entry.session.disconnect().await)
        }))
        .await;

        for (host, result) in results {
            if let Err(e) = result {
                tracing::warn!("Error closing connection to {}: {}", host, e);
            }
        }
        self.shared.prune_gates();
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_sweeper<C: Connector>(
    shared: Weak<PoolShared<C>>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    let reaped = shared.reap_idle().await;
                    if reaped > 0 {
                        tracing::info!("Cleaned up {} idle connections", reaped);
                    }
                }
            }
        }
        tracing::debug!("Connection sweeper stopped");
    })
}
