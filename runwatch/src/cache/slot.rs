//! Adaptive cache slot.
//!
//! A slot holds one cached value and decides on its own how often to
//! re-check the source behind it. Each due refresh adjusts the delay:
//!
//! ```text
//! changed    delay = max(min, delay / growth)
//! unchanged  delay = min(max, elapsed_since_last_refresh * growth)
//! deferred   delay and last-refresh time untouched
//! error      delay and last-refresh time untouched, error returned
//! ```
//!
//! The unchanged case grows from the measured time since the last refresh,
//! not from the previous delay.
//!
//! # Concurrency
//!
//! The slot state sits behind a `tokio::sync::Mutex` held for the whole
//! refresh. Each `get()` notes the refresh generation before queueing on the
//! lock; if a refresh completed while it waited, it returns that result
//! instead of refreshing again, however long the refresh took. Only the
//! refresh holding the lock writes slot fields.
//!
//! `invalidate()` is synchronous: it raises a flag that the next `get()`
//! consumes under the lock, discarding the cached value.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::{Probe, RefreshSource};
use crate::store::SourceError;

/// Invalid delay policy parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DelayPolicyError {
    #[error("Minimum delay must be greater than zero")]
    ZeroMinimum,

    #[error("Minimum delay {min:?} exceeds maximum delay {max:?}")]
    MinAboveMax { min: Duration, max: Duration },

    #[error("Growth factor must be a finite number greater than 1 (got {0})")]
    GrowthTooSmall(f64),
}

/// Bounds and growth factor of a slot's adaptive delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
    growth: f64,
}

impl DelayPolicy {
    /// Run index default: directory listings are cheap.
    pub const INDEX_DEFAULT: DelayPolicy = DelayPolicy {
        min: Duration::from_secs(1),
        max: Duration::from_secs(15),
        growth: 2.0,
    };

    /// Run snapshot default: full reloads are expensive.
    pub const SNAPSHOT_DEFAULT: DelayPolicy = DelayPolicy {
        min: Duration::from_secs(2),
        max: Duration::from_secs(300),
        growth: 1.5,
    };

    /// Create a validated policy.
    ///
    /// # Errors
    ///
    /// Rejects a zero minimum, `min > max`, and growth factors `<= 1`.
    pub fn new(min: Duration, max: Duration, growth: f64) -> Result<Self, DelayPolicyError> {
        if min.is_zero() {
            return Err(DelayPolicyError::ZeroMinimum);
        }
        if min > max {
            return Err(DelayPolicyError::MinAboveMax { min, max });
        }
        if !growth.is_finite() || growth <= 1.0 {
            return Err(DelayPolicyError::GrowthTooSmall(growth));
        }
        Ok(Self { min, max, growth })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    /// Delay after a refresh that found a change.
    pub fn shrink(&self, current: Duration) -> Duration {
        self.clamp_secs(current.as_secs_f64() / self.growth)
    }

    /// Delay after a refresh that found no change, `elapsed` after the last one.
    pub fn grow(&self, elapsed: Duration) -> Duration {
        self.clamp_secs(elapsed.as_secs_f64() * self.growth)
    }

    fn clamp_secs(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .clamp(self.min, self.max)
    }
}

struct SlotState<T> {
    value: Option<Arc<T>>,
    last_refreshed_at: Option<Instant>,
    current_delay: Duration,
}

/// One cached value with self-tuning refresh delay.
///
/// # Example
///
/// ```ignore
/// let slot = AdaptiveCacheSlot::new(scanner, DelayPolicy::new(min, max, 2.0)?);
///
/// let index = slot.get().await?;   // loads on first call
/// let index = slot.get().await?;   // cached until the delay elapses
/// slot.invalidate();               // next get() reloads unconditionally
/// ```
pub struct AdaptiveCacheSlot<S: RefreshSource> {
    source: S,
    policy: DelayPolicy,
    state: Mutex<SlotState<S::Value>>,
    invalidated: AtomicBool,
    /// Completed refresh attempts, bumped under the state lock.
    generation: AtomicU64,
}

impl<S: RefreshSource> AdaptiveCacheSlot<S> {
    /// Create an empty slot; the delay starts at the policy minimum.
    pub fn new(source: S, policy: DelayPolicy) -> Self {
        Self {
            source,
            policy,
            state: Mutex::new(SlotState {
                value: None,
                last_refreshed_at: None,
                current_delay: policy.min(),
            }),
            invalidated: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// The refresh source behind this slot.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> DelayPolicy {
        self.policy
    }

    /// Return the cached value, refreshing it first if it is due.
    ///
    /// # Errors
    ///
    /// Propagates source errors. On error the cached value, the delay and
    /// the last refresh time are left as they were.
    pub async fn get(&self) -> Result<Arc<S::Value>, SourceError> {
        let seen = self.generation.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if self.invalidated.swap(false, Ordering::AcqRel) {
            state.value = None;
        }

        let now = Instant::now();

        let previous = match state.value.clone() {
            Some(value) => value,
            None => {
                let value = Arc::new(self.source.reload().await?);
                state.value = Some(Arc::clone(&value));
                state.current_delay = self.policy.shrink(state.current_delay);
                state.last_refreshed_at = Some(now);
                self.bump_generation();
                return Ok(value);
            }
        };

        // A refresh finished while this call waited for the lock
        if self.generation.load(Ordering::Acquire) != seen {
            return Ok(previous);
        }

        let elapsed = state
            .last_refreshed_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(state.current_delay);

        if elapsed < state.current_delay {
            return Ok(previous);
        }

        let outcome = self.source.probe(&previous).await?;
        self.bump_generation();

        match outcome {
            Probe::Changed(value) => {
                let value = Arc::new(value);
                state.value = Some(Arc::clone(&value));
                state.current_delay = self.policy.shrink(state.current_delay);
                state.last_refreshed_at = Some(now);
                tracing::debug!(delay_ms = state.current_delay.as_millis() as u64, "Slot changed");
                Ok(value)
            }
            Probe::Unchanged => {
                state.current_delay = self.policy.grow(elapsed);
                state.last_refreshed_at = Some(now);
                tracing::debug!(delay_ms = state.current_delay.as_millis() as u64, "Slot unchanged");
                Ok(previous)
            }
            Probe::Deferred => Ok(previous),
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop the cached value; the next `get()` reloads unconditionally.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// Current refresh delay.
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.current_delay
    }

    /// When the last refresh (change or no change) happened.
    pub async fn last_refreshed_at(&self) -> Option<Instant> {
        self.state.lock().await.last_refreshed_at
    }

    /// The cached value without refreshing, if any.
    pub async fn peek(&self) -> Option<Arc<S::Value>> {
        if self.invalidated.load(Ordering::Acquire) {
            return None;
        }
        self.state.lock().await.value.clone()
    }
}
