//! Shared bootstrap library for the melsrv workspace
//!
//! Provides the pieces every service binary needs before it can do real work:
//! - logging initialization (console + optional daily rolling file)
//! - configuration loading (YAML file + prefixed environment overrides)
//! - graceful shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;

