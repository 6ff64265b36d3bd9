//! Tracing setup.
//!
//! Console output goes to stderr so remote command output on stdout stays
//! clean. With a log directory, operational logs rotate daily into
//! `hostlink.log` and `target: "security"` events are additionally written to
//! `security.log` regardless of `RUST_LOG`.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset; russh is chatty at info
const DEFAULT_FILTER: &str = "info,russh=warn";

/// Flushes the file writers when dropped; keep alive until exit
#[must_use]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn audit_filter() -> Targets {
    Targets::new().with_target("security", Level::INFO)
}

pub fn init_logging(log_dir: Option<PathBuf>) -> LogGuards {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(console_layer).init();
        return LogGuards { _guards: Vec::new() };
    };

    let (operational, operational_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "hostlink.log"));
    let (audit, audit_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "security.log"));

    let file_layer = fmt::layer()
        .with_writer(operational)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());
    let audit_layer = fmt::layer()
        .with_writer(audit)
        .with_ansi(false)
        .with_filter(audit_filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(audit_layer)
        .init();

    LogGuards {
        _guards: vec![operational_guard, audit_guard],
    }
}
