//! Runwatch - adaptive polling cache over experiment run records
//!
//! Training runs are written to disk by the training process (descriptor
//! YAML, SQLite scalars, artifacts) while a dashboard reads them. This crate
//! serves near-real-time snapshots of those runs without re-reading every
//! file on every request: each cached value re-checks its source on a delay
//! that shrinks while the source is changing and grows while it is idle.
//!
//! # Modules
//!
//! - [`cache`]: adaptive slots, the run index, run snapshots and the orchestrator
//! - [`store`]: read access to the on-disk run records
//! - [`run`]: plain data types returned to callers
//! - [`config`]: INI configuration file
//! - [`logging`]: tracing subscriber setup for binaries

pub mod cache;
pub mod config;
pub mod logging;
pub mod run;
pub mod store;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
