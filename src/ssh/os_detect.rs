//! OS detection for remote SSH hosts
//!
//! Classifies a host by running a cascade of probes (Windows, then Linux,
//! then generic Unix) over an existing session. The first probe that
//! recognises the host wins; when none does the host is classified as
//! unknown with a plain `sh` dialect. Results are cached per host.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::session::{CommandResult, RemoteSession};

/// Default lifetime of a cached classification
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const WINDOWS_PROBE: &str =
    "systeminfo | findstr /C:\"OS Name\" /C:\"OS Version\" /C:\"System Type\"";
const WINDOWS_FALLBACK_PROBE: &str = "echo %OS%";
const LINUX_PROBE: &str =
    "cat /etc/os-release 2>/dev/null || cat /etc/lsb-release 2>/dev/null || echo \"ID=linux\"";
const UNIX_PROBE: &str = "uname -s 2>/dev/null";
const ARCH_PROBE: &str = "uname -m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Unix,
    Unknown,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Unix => "unix",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command syntax the host's default shell expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellDialect {
    PowerShell,
    Cmd,
    Bash,
    Sh,
}

impl ShellDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellDialect::PowerShell => "powershell",
            ShellDialect::Cmd => "cmd",
            ShellDialect::Bash => "bash",
            ShellDialect::Sh => "sh",
        }
    }
}

impl std::fmt::Display for ShellDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsClassification {
    pub family: OsFamily,
    pub version: String,
    pub architecture: Option<String>,
    pub shell: ShellDialect,
    pub detected_at: DateTime<Utc>,
}

impl OsClassification {
    fn new(family: OsFamily, version: impl Into<String>, shell: ShellDialect) -> Self {
        Self {
            family,
            version: version.into(),
            architecture: None,
            shell,
            detected_at: Utc::now(),
        }
    }

    /// Classification used when no probe recognises the host
    pub fn unknown() -> Self {
        Self::new(OsFamily::Unknown, "Unknown", ShellDialect::Sh)
    }

    fn with_architecture(mut self, architecture: Option<String>) -> Self {
        self.architecture = architecture;
        self
    }
}

/// Result of running a single probe
#[derive(Debug)]
enum ProbeOutcome {
    Matched(OsClassification),
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Windows,
    Linux,
    Unix,
}

impl Probe {
    const CASCADE: [Probe; 3] = [Probe::Windows, Probe::Linux, Probe::Unix];

    async fn run<S: RemoteSession + ?Sized>(self, session: &S) -> ProbeOutcome {
        match self {
            Probe::Windows => probe_windows(session).await,
            Probe::Linux => probe_linux(session).await,
            Probe::Unix => probe_unix(session).await,
        }
    }
}

async fn probe_windows<S: RemoteSession + ?Sized>(session: &S) -> ProbeOutcome {
    match session.execute_command(WINDOWS_PROBE).await {
        Ok(result) if result.success() => match parse_systeminfo(&result.stdout) {
            Some(classification) => ProbeOutcome::Matched(classification),
            None => ProbeOutcome::Inconclusive,
        },
        Ok(result) => {
            tracing::debug!("systeminfo exited with status {}", result.exit_code);
            probe_windows_env(session).await
        }
        Err(e) => {
            tracing::debug!("systeminfo probe failed: {}", e);
            probe_windows_env(session).await
        }
    }
}

async fn probe_windows_env<S: RemoteSession + ?Sized>(session: &S) -> ProbeOutcome {
    match session.execute_command(WINDOWS_FALLBACK_PROBE).await {
        Ok(result) if result.success() && mentions_windows(&result.stdout) => {
            ProbeOutcome::Matched(OsClassification::new(
                OsFamily::Windows,
                "Windows (detected via %OS%)",
                ShellDialect::Cmd,
            ))
        }
        _ => ProbeOutcome::Inconclusive,
    }
}

async fn probe_linux<S: RemoteSession + ?Sized>(session: &S) -> ProbeOutcome {
    let result = match session.execute_command(LINUX_PROBE).await {
        Ok(result) if result.success() => result,
        _ => return ProbeOutcome::Inconclusive,
    };

    match parse_os_release(&result.stdout) {
        Some(version) => {
            let architecture = detect_architecture(session).await;
            ProbeOutcome::Matched(
                OsClassification::new(OsFamily::Linux, version, ShellDialect::Bash)
                    .with_architecture(architecture),
            )
        }
        None => ProbeOutcome::Inconclusive,
    }
}

async fn probe_unix<S: RemoteSession + ?Sized>(session: &S) -> ProbeOutcome {
    let kernel = match session.execute_command(UNIX_PROBE).await {
        Ok(CommandResult {
            stdout, exit_code: 0, ..
        }) if !stdout.trim().is_empty() => stdout.trim().to_string(),
        _ => return ProbeOutcome::Inconclusive,
    };

    let architecture = detect_architecture(session).await;
    ProbeOutcome::Matched(
        OsClassification::new(OsFamily::Unix, kernel, ShellDialect::Bash)
            .with_architecture(architecture),
    )
}

async fn detect_architecture<S: RemoteSession + ?Sized>(session: &S) -> Option<String> {
    match session.execute_command(ARCH_PROBE).await {
        Ok(result) if result.success() => {
            Some(result.stdout.trim().to_string()).filter(|arch| !arch.is_empty())
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Architecture probe failed: {}", e);
            None
        }
    }
}

fn mentions_windows(output: &str) -> bool {
    output.to_lowercase().contains("windows")
}

/// Parse the filtered `systeminfo` output of a Windows host.
fn parse_systeminfo(output: &str) -> Option<OsClassification> {
    if !mentions_windows(output) {
        return None;
    }

    let mut version = None;
    let mut architecture = None;
    for line in output.lines() {
        let value = || {
            line.split_once(':')
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if line.contains("OS Name") {
            version = value();
        } else if line.contains("System Type") {
            architecture = value();
        }
    }

    Some(
        OsClassification::new(
            OsFamily::Windows,
            version.unwrap_or_else(|| "Unknown".to_string()),
            ShellDialect::PowerShell,
        )
        .with_architecture(architecture),
    )
}

/// Extract a human-readable distribution name from os-release or lsb-release
/// content. `None` when the content is neither.
fn parse_os_release(output: &str) -> Option<String> {
    let lowered = output.to_lowercase();
    if !lowered.contains("id=") && !lowered.contains("name=") {
        return None;
    }

    let field = |key: &str| {
        output.lines().find_map(|line| {
            line.trim()
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.replace(['"', '\''], "").trim().to_string())
                .filter(|value| !value.is_empty())
        })
    };

    Some(
        field("PRETTY_NAME")
            .or_else(|| field("NAME"))
            .or_else(|| field("DISTRIB_DESCRIPTION"))
            .unwrap_or_else(|| "Linux".to_string()),
    )
}

#[derive(Debug, Clone)]
struct CacheEntry {
    classification: OsClassification,
    detected: Instant,
}

/// Host classifier with a per-host result cache
#[derive(Debug)]
pub struct OsDetector {
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for OsDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl OsDetector {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached classification for `host`, if still fresh
    pub fn cached(&self, host: &str) -> Option<OsClassification> {
        let cache = self.cache.lock();
        cache
            .get(host)
            .filter(|entry| entry.detected.elapsed() < self.ttl)
            .map(|entry| entry.classification.clone())
    }

    /// Classify `host` using `session`. Never fails: a host no probe
    /// recognises is reported as [`OsFamily::Unknown`].
    pub async fn detect<S: RemoteSession + ?Sized>(
        &self,
        session: &S,
        host: &str,
    ) -> OsClassification {
        if let Some(classification) = self.cached(host) {
            tracing::debug!("Using cached OS classification for {}", host);
            return classification;
        }

        tracing::info!("Detecting OS for {}", host);
        let mut classification = None;
        for probe in Probe::CASCADE {
            if let ProbeOutcome::Matched(found) = probe.run(session).await {
                classification = Some(found);
                break;
            }
            tracing::debug!("{:?} probe inconclusive for {}", probe, host);
        }

        let classification = match classification {
            Some(found) => {
                tracing::info!(
                    "Detected {} on {}: {}",
                    found.family,
                    host,
                    found.version
                );
                found
            }
            None => {
                tracing::warn!("Unknown OS detected on {}, using generic shell", host);
                OsClassification::unknown()
            }
        };

        self.cache.lock().insert(
            host.to_string(),
            CacheEntry {
                classification: classification.clone(),
                detected: Instant::now(),
            },
        );
        classification
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}
