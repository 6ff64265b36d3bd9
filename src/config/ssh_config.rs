//! Host lookups in the OpenSSH client config.
//!
//! Only the first `Host` block matching the target is consulted, and only
//! `HostName`, `User`, `Port` and `IdentityFile` are understood.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::paths::{expand_tilde, ssh_config_file, ssh_dir};
use crate::error::ConfigError;

#[derive(Default, Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    hostname: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    identity_files: Vec<PathBuf>,
}

/// Settings found for one host in an OpenSSH client config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshHostEntry {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
}

impl SshHostEntry {
    /// First identity file that exists on disk
    pub fn existing_identity_file(&self) -> Option<PathBuf> {
        self.identity_files.iter().find(|path| path.exists()).cloned()
    }
}

/// Read `path` (or `~/.ssh/config`) and return the entry for `host`.
///
/// A missing file is not an error.
pub fn load_for_host(path: Option<&Path>, host: &str) -> Result<Option<SshHostEntry>, ConfigError> {
    let path = match path {
        Some(path) => expand_tilde(&path.to_string_lossy()),
        None => ssh_config_file().ok_or_else(|| ConfigError::ReadFile {
            path: PathBuf::from("~/.ssh/config"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine SSH config path",
            ),
        })?,
    };

    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
        path: path.clone(),
        source: e,
    })?;

    Ok(lookup_host(&content, host))
}

/// Return the settings of the first `Host` block whose patterns match `host`.
pub fn lookup_host(content: &str, host: &str) -> Option<SshHostEntry> {
    parse_blocks(content)
        .into_iter()
        .find(|block| block_matches(&block.patterns, host))
        .map(|block| SshHostEntry {
            hostname: block.hostname,
            user: block.user,
            port: block.port,
            identity_files: block.identity_files,
        })
}

fn parse_blocks(content: &str) -> Vec<HostBlock> {
    let mut blocks = Vec::new();
    let mut current = HostBlock::default();
    let mut in_match_block = false;

    for raw_line in content.lines() {
        let line = strip_comments(raw_line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens = split_tokens(line);
        if tokens.is_empty() {
            continue;
        }

        let key = tokens[0].to_ascii_lowercase();
        if key == "match" {
            // Match blocks are not evaluated.
            flush_block(&mut current, &mut blocks);
            in_match_block = true;
            continue;
        }

        if key == "host" {
            in_match_block = false;
            flush_block(&mut current, &mut blocks);
            current.patterns = tokens[1..]
                .iter()
                .flat_map(|token| token.split(','))
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_string)
                .collect();
            continue;
        }

        if in_match_block || current.patterns.is_empty() {
            continue;
        }

        match key.as_str() {
            "hostname" => {
                if let Some(value) = tokens.get(1) {
                    current.hostname = Some(value.to_string());
                }
            }
            "user" => {
                if let Some(value) = tokens.get(1) {
                    current.user = Some(value.to_string());
                }
            }
            "port" => {
                if let Some(value) = tokens.get(1) {
                    if let Ok(port) = value.parse::<u16>() {
                        current.port = Some(port);
                    }
                }
            }
            "identityfile" => {
                if let Some(value) = tokens.get(1) {
                    current.identity_files.push(expand_identity_path(value));
                }
            }
            _ => {}
        }
    }

    flush_block(&mut current, &mut blocks);
    blocks
}

fn flush_block(current: &mut HostBlock, blocks: &mut Vec<HostBlock>) {
    let block = std::mem::take(current);
    if !block.patterns.is_empty() {
        blocks.push(block);
    }
}

fn block_matches(patterns: &[String], host: &str) -> bool {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if pattern_matches(negated, host) {
                return false;
            }
        } else if pattern_matches(pattern, host) {
            matched = true;
        }
    }
    matched
}

fn pattern_matches(pattern: &str, host: &str) -> bool {
    let translated = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    match Regex::new(&format!("^{}$", translated)) {
        Ok(re) => re.is_match(host),
        Err(e) => {
            tracing::debug!("Ignoring unusable ssh_config pattern '{}': {}", pattern, e);
            false
        }
    }
}

fn expand_identity_path(raw: &str) -> PathBuf {
    let cleaned = raw.trim_matches('"');
    let expanded = expand_tilde(cleaned);
    if expanded.is_absolute() {
        return expanded;
    }

    if let Some(dir) = ssh_dir() {
        return dir.join(expanded);
    }

    expanded
}

fn strip_comments(line: &str) -> String {
    let mut result = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                result.push(ch);
            }
            '#' if !in_quotes => break,
            _ => result.push(ch),
        }
    }
    result
}

fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    let mut in_quotes = false;

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if (c.is_whitespace() || c == '=') && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
