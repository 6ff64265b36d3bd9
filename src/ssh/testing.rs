//! In-memory sessions and connectors for exercising the pool, the detector
//! and the liveness probe without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ConnectionConfig;
use crate::error::SshError;

use super::session::{CommandResult, Connector, RemoteSession};

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

pub const PING: &str = "echo \"ping\"";
pub const WINDOWS_PROBE: &str =
    "systeminfo | findstr /C:\"OS Name\" /C:\"OS Version\" /C:\"System Type\"";
pub const WINDOWS_FALLBACK_PROBE: &str = "echo %OS%";
pub const LINUX_PROBE: &str =
    "cat /etc/os-release 2>/dev/null || cat /etc/lsb-release 2>/dev/null || echo \"ID=linux\"";
pub const UNIX_PROBE: &str = "uname -s 2>/dev/null";
pub const ARCH_PROBE: &str = "uname -m";

/// Canned behaviour for one command.
#[derive(Debug, Clone)]
pub enum Reply {
    Output { stdout: String, exit_code: i32 },
    /// The command cannot be dispatched
    Fail,
    /// The command never completes
    Hang,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Output {
            stdout: stdout.to_string(),
            exit_code: 0,
        }
    }

    pub fn exit(exit_code: i32, stdout: &str) -> Self {
        Reply::Output {
            stdout: stdout.to_string(),
            exit_code,
        }
    }
}

/// Session whose command output is scripted per command string.
///
/// Commands without a script exit with status 127.
#[derive(Debug)]
pub struct ScriptedSession {
    id: usize,
    replies: HashMap<String, Reply>,
    commands: Mutex<Vec<String>>,
    connected: AtomicBool,
    disconnects: AtomicUsize,
    user: Option<String>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            replies: HashMap::new(),
            commands: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            disconnects: AtomicUsize::new(0),
            user: None,
        }
    }

    /// Report `user` as the authenticated user
    pub fn logged_in_as(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    /// A responsive Ubuntu host
    pub fn linux() -> Self {
        Self::new()
            .reply(PING, Reply::ok("ping\n"))
            .reply(WINDOWS_PROBE, Reply::exit(127, ""))
            .reply(WINDOWS_FALLBACK_PROBE, Reply::ok("%OS%\n"))
            .reply(
                LINUX_PROBE,
                Reply::ok(
                    "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nPRETTY_NAME=\"Ubuntu 22.04.3 LTS\"\n",
                ),
            )
            .reply(ARCH_PROBE, Reply::ok("x86_64\n"))
    }

    /// A responsive Windows Server host with OpenSSH
    pub fn windows() -> Self {
        Self::new()
            .reply(PING, Reply::ok("ping\r\n"))
            .reply(
                WINDOWS_PROBE,
                Reply::ok(
                    "OS Name:                   Microsoft Windows Server 2022 Standard\r\n\
                     OS Version:                10.0.20348 N/A Build 20348\r\n\
                     System Type:               x64-based PC\r\n",
                ),
            )
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands.lock().iter().filter(|c| *c == command).count()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl RemoteSession for ScriptedSession {
    async fn execute_command(&self, command: &str) -> Result<CommandResult, SshError> {
        self.commands.lock().push(command.to_string());
        let reply = self
            .replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| Reply::exit(127, ""));

        match reply {
            Reply::Output { stdout, exit_code } => Ok(CommandResult {
                stdout,
                stderr: String::new(),
                exit_code,
            }),
            Reply::Fail => Err(SshError::Channel(format!("cannot run '{}'", command))),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self) -> Result<(), SshError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn authenticated_user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

type SessionFactory = Box<dyn Fn() -> ScriptedSession + Send + Sync>;

/// Connector handing out scripted sessions and recording every attempt.
pub struct ScriptedConnector {
    factory: SessionFactory,
    attempts: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    delay: Option<Duration>,
}

impl ScriptedConnector {
    pub fn new(factory: impl Fn() -> ScriptedSession + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            attempts: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            delay: None,
        }
    }

    pub fn linux() -> Self {
        Self::new(ScriptedSession::linux)
    }

    /// Every connect takes `delay` before it completes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent connects fail with `reason` (or succeed again with `None`)
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.fail_with.lock() = reason.map(str::to_string);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self, host: &str, config: &ConnectionConfig) -> Result<ScriptedSession, SshError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.fail_with.lock().clone();
        if let Some(reason) = failure {
            return Err(SshError::ConnectionFailed {
                host: host.to_string(),
                port: config.port_or_default(),
                reason,
            });
        }
        Ok((self.factory)())
    }
}
