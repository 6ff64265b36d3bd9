use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::error::SshError;
use crate::security_log;

use super::handler::ClientHandler;

/// Result of executing a command, including output and exit code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The narrow contract the pool, the OS detector and the liveness checker
/// rely on.
pub trait RemoteSession: Send + Sync + 'static {
    /// Run `command` in a fresh exec channel.
    ///
    /// Fails with [`SshError::Channel`] only when the command cannot be
    /// dispatched; a non-zero exit code is returned as a normal result.
    fn execute_command(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<CommandResult, SshError>> + Send;

    /// Tear the session down. Calling it again is a no-op.
    fn disconnect(&self) -> impl Future<Output = Result<(), SshError>> + Send;

    /// Liveness flag maintained by the session itself.
    fn is_connected(&self) -> bool;

    /// The user the server authenticated, when the session knows it. This can
    /// differ from the requested one when `~/.ssh/config` supplied the `User`.
    fn authenticated_user(&self) -> Option<&str> {
        None
    }
}

/// Establishes sessions for the pool.
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    fn connect(
        &self,
        host: &str,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Session, SshError>> + Send;
}

impl<C: Connector> Connector for Arc<C> {
    type Session = C::Session;

    fn connect(
        &self,
        host: &str,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Session, SshError>> + Send {
        self.as_ref().connect(host, config)
    }
}

/// Authenticated SSH connection used for non-interactive command execution
pub struct SshSession {
    handle: Arc<Mutex<Handle<ClientHandler>>>,
    host: Arc<str>,
    port: u16,
    username: String,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("handle", &"<handle>")
            .finish()
    }
}

impl SshSession {
    pub fn new(handle: Handle<ClientHandler>, host: &str, port: u16, username: &str) -> Self {
        Self {
            handle: Arc::new(Mutex::new(handle)),
            host: Arc::from(host),
            port,
            username: username.to_string(),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_ref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Output gathered from one exec channel.
///
/// Servers usually send `exit-status` after `eof`, so only `close` (or the
/// channel going away) ends collection.
#[derive(Debug, Default)]
struct ExecOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ExecOutput {
    /// Record `msg`; true once the channel is closed
    fn absorb(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => {
                self.stdout.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelMsg::ExtendedData { data, .. } => {
                self.stderr.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelMsg::ExitStatus { exit_status } => {
                self.exit_code = exit_status as i32;
            }
            ChannelMsg::Close => return true,
            _ => {}
        }
        false
    }

    fn into_result(self) -> CommandResult {
        CommandResult {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
        }
    }
}

impl RemoteSession for SshSession {
    async fn execute_command(&self, command: &str) -> Result<CommandResult, SshError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SshError::Channel("Session is disconnected".to_string()));
        }

        let handle = self.handle.lock().await;
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;
        drop(handle);

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to exec '{}': {}", command, e)))?;

        let mut output = ExecOutput::default();
        while let Some(msg) = channel.wait().await {
            if output.absorb(msg) {
                break;
            }
        }

        if output.exit_code != 0 {
            tracing::debug!("{} exited with status {}", command, output.exit_code);
        }
        Ok(output.into_result())
    }

    async fn disconnect(&self) -> Result<(), SshError> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        security_log::log_ssh_disconnect(self.host.as_ref(), self.port, true);

        let handle_guard = self.handle.lock().await;
        if handle_guard.is_closed() {
            return Ok(());
        }
        handle_guard
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    fn authenticated_user(&self) -> Option<&str> {
        Some(&self.username)
    }

    fn is_connected(&self) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            return false;
        }
        // A held lock means a channel is being opened right now.
        match self.handle.try_lock() {
            Ok(handle) => !handle.is_closed(),
            Err(_) => true,
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        security_log::log_ssh_disconnect(self.host.as_ref(), self.port, false);
        let handle = self.handle.clone();
        let host = self.host.to_string();
        let port = self.port;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    let handle_guard = handle.lock().await;
                    let _ = handle_guard
                        .disconnect(Disconnect::ByApplication, "session dropped", "en")
                        .await;
                    tracing::debug!("SSH session cleanup: disconnected {}:{}", host, port);
                });
            }
            Err(_) => {
                tracing::debug!("SSH session dropped without a Tokio runtime; disconnect skipped");
            }
        }
    }
}
