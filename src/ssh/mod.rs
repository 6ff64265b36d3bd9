//! SSH module for hostlink
//!
//! Session establishment, pooling, liveness probing, OS classification and
//! command adaptation.

pub mod auth;
pub mod client;
pub mod command;
pub mod connection_pool;
pub mod handler;
pub mod liveness;
pub mod os_detect;
pub mod reconnect;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use client::SshClient;
pub use command::{CommandRequest, DiagnosticCommand, adapt, format_command};
pub use connection_pool::{ConnectionKey, ConnectionPool, PoolStatus};
pub use os_detect::{OsClassification, OsDetector, OsFamily, ShellDialect};
pub use reconnect::ReconnectPolicy;
pub use session::{CommandResult, Connector, RemoteSession, SshSession};
