//! Docker-based SSH test fixtures

use std::path::PathBuf;
use std::process::Command;
use std::sync::{LazyLock, Once};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout};

use hostlink::config::{ConnectionConfig, HostKeyPolicy, SshDefaults};
use hostlink::ssh::SshClient;
use hostlink::ssh::handler::KnownHostsFiles;

static DOCKER_INIT: Once = Once::new();
static DOCKER_AVAILABLE: AtomicBool = AtomicBool::new(false);

// The containers are shared, so tests touching them run one at a time
static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn acquire_test_lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().await
}

/// Configuration for the test SSH server
#[derive(Debug, Clone)]
pub struct TestSshServer {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub private_key_path: PathBuf,
    pub encrypted_key_path: PathBuf,
    pub key_passphrase: String,
}

impl Default for TestSshServer {
    fn default() -> Self {
        let test_keys_dir =
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/docker/test_keys");
        Self {
            host: "127.0.0.1".to_string(),
            port: 2222,
            username: "testuser".to_string(),
            password: "testpass123".to_string(),
            private_key_path: test_keys_dir.join("id_ed25519"),
            encrypted_key_path: test_keys_dir.join("id_ed25519_encrypted"),
            key_passphrase: "testpassphrase".to_string(),
        }
    }
}

/// `docker compose` or the standalone `docker-compose`, whichever answers
fn compose_command() -> Option<(&'static str, Vec<&'static str>)> {
    let answers = |program: &str, args: &[&str]| {
        Command::new(program)
            .args(args)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    };

    if answers("docker", &["compose", "version"]) {
        Some(("docker", vec!["compose"]))
    } else if answers("docker-compose", &["--version"]) {
        Some(("docker-compose", Vec::new()))
    } else {
        None
    }
}

/// Bring up the OpenSSH container once per test binary.
///
/// Setting `HOSTLINK_SKIP_DOCKER` skips every container-backed test.
pub fn ensure_docker_started() {
    DOCKER_INIT.call_once(|| {
        if std::env::var_os("HOSTLINK_SKIP_DOCKER").is_some() {
            eprintln!("HOSTLINK_SKIP_DOCKER set, SSH integration tests will be skipped");
            return;
        }

        let Some((program, prefix)) = compose_command() else {
            eprintln!("WARNING: docker compose not available, SSH integration tests will be skipped");
            return;
        };

        let docker_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/docker");
        let status = Command::new(program)
            .current_dir(&docker_dir)
            .args(prefix)
            .args(["up", "-d", "--build", "--wait"])
            .status();

        match status {
            Ok(s) if s.success() => {
                DOCKER_AVAILABLE.store(true, Ordering::SeqCst);
                eprintln!("SSH test container started");
            }
            Ok(s) => eprintln!("Failed to start SSH test container: exit code {:?}", s.code()),
            Err(e) => eprintln!("Failed to start SSH test container: {}", e),
        }
    });
}

pub fn is_docker_available() -> bool {
    ensure_docker_started();
    DOCKER_AVAILABLE.load(Ordering::SeqCst)
}

/// Wait until the server sends its SSH identification banner
pub async fn wait_for_ssh_ready(host: &str, port: u16) -> Result<(), String> {
    const ATTEMPTS: u32 = 30;
    let addr = format!("{}:{}", host, port);

    for _ in 0..ATTEMPTS {
        let banner = timeout(Duration::from_secs(2), async {
            let mut stream = TcpStream::connect(&addr).await?;
            let mut buf = [0u8; 8];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        })
        .await;

        if let Ok(Ok(buf)) = banner {
            if buf.starts_with(b"SSH-2.0") {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(200)).await;
    }

    Err(format!("No SSH banner from {} after {} attempts", addr, ATTEMPTS))
}

/// Test environment with isolated known_hosts and Docker fixtures
pub struct SshTestEnvironment {
    pub server: TestSshServer,
    pub config_dir: TempDir,
    pub known_hosts_path: PathBuf,
}

impl SshTestEnvironment {
    pub async fn new() -> Result<Self, String> {
        if !is_docker_available() {
            return Err("Docker not available".to_string());
        }

        let server = TestSshServer::default();
        wait_for_ssh_ready(&server.host, server.port).await?;

        let config_dir = TempDir::new().map_err(|e| format!("Failed to create temp dir: {}", e))?;
        let known_hosts_path = config_dir.path().join("known_hosts");

        Ok(Self {
            server,
            config_dir,
            known_hosts_path,
        })
    }

    pub fn password_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            port: Some(self.server.port),
            use_agent: Some(false),
            ..ConnectionConfig::with_password(&self.server.username, &self.server.password)
        }
    }

    pub fn key_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            port: Some(self.server.port),
            use_agent: Some(false),
            ..ConnectionConfig::with_private_key(&self.server.username, &self.server.private_key_path)
        }
    }

    /// Client that learns host keys into this environment's known_hosts file
    pub fn client(&self, policy: HostKeyPolicy) -> SshClient {
        let defaults = SshDefaults {
            connection_timeout_secs: 10,
            host_key_policy: policy,
            ..SshDefaults::default()
        };
        SshClient::with_known_hosts(
            defaults,
            KnownHostsFiles {
                primary: Some(self.known_hosts_path.clone()),
                openssh: None,
            },
        )
    }
}

/// Macro to skip tests when Docker is not available
#[macro_export]
macro_rules! skip_if_no_docker {
    () => {
        if !super::fixtures::is_docker_available() {
            eprintln!("Skipping test: Docker not available");
            return;
        }
    };
}
