//! Security event logging for audit trails.
//!
//! Structured events for authentication, session establishment and session
//! teardown. All events use `target: "security"` so they can be filtered
//! separately from operational logs.
//!
//! # Example
//!
//! Show security events only:
//! ```bash
//! RUST_LOG=security=info hostlink db01.internal
//! ```

use tracing::{info, warn};

/// Log an SSH authentication attempt.
///
/// Called before attempting to authenticate with a remote host.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log a host key that was learned on first contact.
pub fn log_host_key_learned(host: &str, port: u16, fingerprint: &str) {
    info!(
        target: "security",
        event = "host_key_learned",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Learned new host key"
    );
}

/// Log a host key that did not pass verification.
pub fn log_host_key_rejected(host: &str, port: u16, reason: &str) {
    warn!(
        target: "security",
        event = "host_key_rejected",
        host = %host,
        port = port,
        reason = %reason,
        "Host key rejected"
    );
}

/// Log a session being added to the connection pool.
pub fn log_connection_pooled(host: &str, username: &str) {
    info!(
        target: "security",
        event = "connection_pooled",
        host = %host,
        username = %username,
        "SSH session pooled"
    );
}

/// Log a pooled session being evicted.
pub fn log_connection_evicted(host: &str, username: &str, reason: &str) {
    info!(
        target: "security",
        event = "connection_evicted",
        host = %host,
        username = %username,
        reason = %reason,
        "SSH session evicted from pool"
    );
}

/// Log an SSH session teardown.
pub fn log_ssh_disconnect(host: &str, port: u16, clean: bool) {
    info!(
        target: "security",
        event = "ssh_disconnect",
        host = %host,
        port = port,
        clean = clean,
        "SSH session closed"
    );
}
