//! Validation of connection targets.
//!
//! Hostnames, ports and usernames are checked before any network activity so
//! malformed input fails fast with a precise message.

use std::net::IpAddr;

use regex::Regex;
use std::sync::LazyLock;

use crate::config::ConnectionConfig;

/// Validation error with field context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static DNS_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").unwrap());

// POSIX names plus the `DOMAIN\user`, `user@domain` and dotted forms used by Windows hosts
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.@\\-]{0,63}$").unwrap());

/// Validate a hostname (DNS name or IP address).
///
/// Accepts:
/// - IPv4 addresses (e.g., "192.168.1.1")
/// - IPv6 addresses (e.g., "::1", "2001:db8::1")
/// - DNS hostnames (RFC 1123 compliant)
///
/// # Errors
///
/// Returns `ValidationError` if the hostname is empty, too long, or malformed.
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();

    if hostname.is_empty() {
        return Err(ValidationError {
            field: "hostname".to_string(),
            message: "Hostname is required".to_string(),
        });
    }

    // DNS max is 253 characters
    if hostname.len() > 253 {
        return Err(ValidationError {
            field: "hostname".to_string(),
            message: "Hostname exceeds maximum length of 253 characters".to_string(),
        });
    }

    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    validate_dns_hostname(hostname)
}

/// Validate a DNS hostname according to RFC 1123.
fn validate_dns_hostname(hostname: &str) -> Result<(), ValidationError> {
    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ValidationError {
                field: "hostname".to_string(),
                message: "Hostname labels must be 1-63 characters".to_string(),
            });
        }

        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(ValidationError {
                field: "hostname".to_string(),
                message: format!(
                    "Invalid hostname label '{}': must start and end with alphanumeric, may contain hyphens",
                    label
                ),
            });
        }
    }

    Ok(())
}

/// Validate a port number string and parse it.
///
/// # Errors
///
/// Returns `ValidationError` if the port is not a valid number in range 1-65535.
pub fn validate_port(port_str: &str) -> Result<u16, ValidationError> {
    let port_str = port_str.trim();

    if port_str.is_empty() {
        return Err(ValidationError {
            field: "port".to_string(),
            message: "Port is required".to_string(),
        });
    }

    match port_str.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        Ok(_) => Err(ValidationError {
            field: "port".to_string(),
            message: "Port must be between 1 and 65535".to_string(),
        }),
        Err(_) => Err(ValidationError {
            field: "port".to_string(),
            message: format!("Invalid port number: '{}'", port_str),
        }),
    }
}

/// Validate a username for SSH connections.
///
/// Empty usernames are accepted and default to the local user.
///
/// # Errors
///
/// Returns `ValidationError` if the username format is invalid.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Ok(());
    }

    if username.len() > 64 {
        return Err(ValidationError {
            field: "username".to_string(),
            message: "Username exceeds maximum length of 64 characters".to_string(),
        });
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError {
            field: "username".to_string(),
            message: "Username must start with a letter or underscore and contain only alphanumeric, '_', '-', '.', '@' or '\\'".to_string(),
        });
    }

    Ok(())
}

/// Validate everything about a target before connecting to it.
pub fn validate_target(host: &str, config: &ConnectionConfig) -> Result<(), ValidationError> {
    validate_hostname(host)?;
    if config.port == Some(0) {
        return Err(ValidationError {
            field: "port".to_string(),
            message: "Port must be between 1 and 65535".to_string(),
        });
    }
    if let Some(username) = &config.username {
        validate_username(username)?;
    }
    Ok(())
}

/// A `[user@]host[:port]` target as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
}

/// Parse `[user@]host[:port]`. IPv6 literals with a port must be bracketed
/// (`[::1]:2222`).
pub fn parse_target(raw: &str) -> Result<Target, ValidationError> {
    let raw = raw.trim();
    let (username, rest) = match raw.rsplit_once('@') {
        Some((user, rest)) => {
            validate_username(user)?;
            (Some(user.to_string()).filter(|u| !u.is_empty()), rest)
        }
        None => (None, raw),
    };

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']').ok_or_else(|| ValidationError {
            field: "hostname".to_string(),
            message: "Unterminated '[' in IPv6 address".to_string(),
        })?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(validate_port(port)?),
            None if after.is_empty() => None,
            None => {
                return Err(ValidationError {
                    field: "hostname".to_string(),
                    message: format!("Unexpected text after IPv6 address: '{}'", after),
                });
            }
        };
        (host.to_string(), port)
    } else if rest.parse::<IpAddr>().is_ok() {
        (rest.to_string(), None)
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(validate_port(port)?)),
            None => (rest.to_string(), None),
        }
    };

    validate_hostname(&host)?;

    Ok(Target {
        host,
        port,
        username,
    })
}
