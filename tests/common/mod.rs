//! Common test utilities

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::Utc;
use hostlink::ssh::{OsClassification, OsFamily, ShellDialect};
use tempfile::TempDir;

/// Test environment with isolated configuration directory
pub struct TestEnvironment {
    pub config_dir: TempDir,
    pub known_hosts_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let known_hosts_path = config_dir.path().join("known_hosts");
        Self {
            config_dir,
            known_hosts_path,
        }
    }

    /// Write an OpenSSH client config into the environment and return its path
    pub fn ssh_config(&self, content: &str) -> PathBuf {
        let path = self.config_dir.path().join("ssh_config");
        std::fs::write(&path, content).expect("Failed to write ssh config");
        path
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.path().join("config.toml")
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

pub fn classified(family: OsFamily, shell: ShellDialect) -> OsClassification {
    OsClassification {
        family,
        version: "test host".to_string(),
        architecture: None,
        shell,
        detected_at: Utc::now(),
    }
}
