//! hostlink library
//!
//! This module exposes the core functionality for use in integration tests
//! and the main binary.

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod ssh;
pub mod validation;

pub(crate) mod security_log;
