//! Filesystem locations used by hostlink.
//!
//! `HOSTLINK_CONFIG_DIR` and `HOSTLINK_LOG_DIR` override the platform
//! defaults chosen by the `directories` crate.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};

const CONFIG_DIR_ENV: &str = "HOSTLINK_CONFIG_DIR";
const LOG_DIR_ENV: &str = "HOSTLINK_LOG_DIR";

/// Identity files tried when nothing else is configured, in order
const DEFAULT_IDENTITIES: [&str; 3] = ["id_rsa", "id_ed25519", "id_ecdsa"];

/// A non-blank override from the environment
fn dir_override(raw: Option<OsString>) -> Option<PathBuf> {
    let raw = raw?;
    let trimmed = raw.to_string_lossy().trim().to_string();
    (!trimmed.is_empty()).then(|| expand_tilde(&trimmed))
}

pub fn config_dir() -> Option<PathBuf> {
    dir_override(std::env::var_os(CONFIG_DIR_ENV)).or_else(|| {
        ProjectDirs::from("com", "hostlink", "hostlink").map(|dirs| dirs.config_dir().to_path_buf())
    })
}

pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Host keys learned by hostlink itself
pub fn known_hosts_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("known_hosts"))
}

/// The user's OpenSSH known_hosts, consulted read-only
pub fn ssh_known_hosts_file() -> Option<PathBuf> {
    ssh_dir().map(|dir| dir.join("known_hosts"))
}

pub fn ssh_config_file() -> Option<PathBuf> {
    ssh_dir().map(|dir| dir.join("config"))
}

pub fn ssh_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".ssh"))
}

pub fn default_identity_files() -> Vec<PathBuf> {
    ssh_dir()
        .map(|dir| DEFAULT_IDENTITIES.iter().map(|name| dir.join(name)).collect())
        .unwrap_or_default()
}

pub fn log_dir() -> Option<PathBuf> {
    match std::env::var_os(LOG_DIR_ENV) {
        // Set but blank disables file logging
        Some(raw) => dir_override(Some(raw)),
        None => config_dir().map(|dir| dir.join("logs")),
    }
}

pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| not_found("Could not determine config directory"))?;
    ensure_private_dir(&dir)?;
    Ok(dir)
}

pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = log_dir().ok_or_else(|| not_found("Could not determine log directory"))?;
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Replace a leading `~` with the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    match (rest, home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
}

/// Create `dir` (and parents) readable by the owner only
fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn not_found(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, message.to_string())
}
