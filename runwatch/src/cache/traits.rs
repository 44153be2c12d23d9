//! Core traits for adaptive cache slots.
//!
//! A slot does not know what it caches. It delegates to a [`RefreshSource`],
//! which knows how to load the value from scratch and how to cheaply probe
//! whether a previously loaded value is still current.
//!
//! # Design Principles
//!
//! - **Two-phase refresh**: `probe` runs on every due refresh and only pays
//!   for a full load when it detects a change; `reload` runs when there is
//!   nothing cached
//! - **Explicit outcomes**: a probe says `Changed`, `Unchanged` or `Deferred`;
//!   the slot turns that into delay adjustments
//! - **Dyn-compatible**: uses `Pin<Box<dyn Future>>` like the store traits

use thiserror::Error;
use uuid::Uuid;

use crate::store::{BoxFuture, SourceError};

/// Outcome of probing a source against a previously cached value.
#[derive(Debug)]
pub enum Probe<T> {
    /// The source changed; this is the new value.
    Changed(T),

    /// The source is unchanged; keep the cached value.
    Unchanged,

    /// The probe could not complete (transient error). Keep the cached value
    /// and retry on the next `get()` without touching the delay.
    Deferred,
}

impl<T> Probe<T> {
    /// Whether this outcome carries a new value.
    pub fn is_changed(&self) -> bool {
        matches!(self, Probe::Changed(_))
    }
}

/// The refresh logic behind an adaptive cache slot.
///
/// Implementors are the slot-specific halves of a cache entry: the run index
/// scanner and the run snapshot loader.
pub trait RefreshSource: Send + Sync {
    /// Value produced by this source.
    type Value: Send + Sync;

    /// Load the value unconditionally.
    ///
    /// Called when nothing is cached: the first `get()` and the first
    /// `get()` after `invalidate()`.
    ///
    /// # Errors
    ///
    /// Any failure is surfaced to the caller of `get()`.
    fn reload(&self) -> BoxFuture<'_, Result<Self::Value, SourceError>>;

    /// Check whether `previous` is still current, reloading if it is not.
    ///
    /// # Errors
    ///
    /// An error propagates to the caller of `get()` and leaves the slot's
    /// cached value and timing untouched. Sources that prefer to keep serving
    /// the cached value on transient failures return [`Probe::Deferred`].
    fn probe<'a>(
        &'a self,
        previous: &'a Self::Value,
    ) -> BoxFuture<'a, Result<Probe<Self::Value>, SourceError>>;
}

/// Errors returned by the cache orchestrator.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The run index could not be scanned, so no run can be resolved.
    #[error("Failed to scan run index: {0}")]
    IndexScan(#[source] SourceError),

    /// A run is listed in the index but could not be loaded.
    #[error("Failed to load run {run_id}: {source}")]
    RunLoad {
        run_id: Uuid,
        #[source]
        source: SourceError,
    },

    /// No experiment in the index contains the run.
    #[error("Run not found: {0}")]
    NotFound(Uuid),
}

/// Result type for orchestrator operations.
pub type CacheResult<T> = Result<T, CacheError>;
