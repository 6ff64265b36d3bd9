pub mod connection;
pub mod paths;
pub mod settings;
pub mod ssh_config;

pub use connection::ConnectionConfig;
pub use settings::{AppConfig, HostKeyPolicy, PoolSettings, RetrySettings, SshDefaults};
pub use ssh_config::SshHostEntry;
