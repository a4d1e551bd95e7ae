//! Outbound-call governor for GRID.
//!
//! # Admission order
//! ```text
//! attempt++ → circuit.check → run budget → rate budget → cache
//! ```
//!
//! A [`Gate`] is built once by the application root and shared by `Arc`;
//! every component guards its own state and no lock is held across I/O.
//! Run budgets are not part of the gate: they are scoped to the calling task
//! with [`with_run_budget`].

pub mod budget;
pub mod cache;
pub mod circuit;
pub mod clock;

use crate::error::GridError;
use budget::{acquire_current_run, RateBudget};
pub use budget::{current_run_budget, with_run_budget, with_run_budget_sync, RunBudget};
use cache::ResponseCache;
use chrono::{DateTime, Utc};
use circuit::{CircuitBreaker, CircuitState};
use clock::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Limits applied by a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub max_requests: u32,
    pub window: Duration,
    pub open_for: Duration,
    pub cache_ttl: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_requests: budget::DEFAULT_MAX_REQUESTS,
            window: budget::DEFAULT_WINDOW,
            open_for: circuit::DEFAULT_OPEN_FOR,
            cache_ttl: cache::DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Default)]
pub struct GateCounters {
    calls_attempted: AtomicU64,
    calls_sent: AtomicU64,
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    rate_budget_denied: AtomicU64,
    run_budget_denied: AtomicU64,
    circuit_open_denied: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub calls_attempted: u64,
    pub calls_sent: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub rate_budget_denied: u64,
    pub run_budget_denied: u64,
    pub circuit_open_denied: u64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

impl GateCounters {
    pub fn mark_call_sent(&self) {
        bump(&self.calls_sent);
    }

    pub fn mark_cache_hit(&self) {
        bump(&self.cache_hit);
    }

    pub fn mark_cache_miss(&self) {
        bump(&self.cache_miss);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            calls_attempted: get(&self.calls_attempted),
            calls_sent: get(&self.calls_sent),
            cache_hit: get(&self.cache_hit),
            cache_miss: get(&self.cache_miss),
            rate_budget_denied: get(&self.rate_budget_denied),
            run_budget_denied: get(&self.run_budget_denied),
            circuit_open_denied: get(&self.circuit_open_denied),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.calls_attempted,
            &self.calls_sent,
            &self.cache_hit,
            &self.cache_miss,
            &self.rate_budget_denied,
            &self.run_budget_denied,
            &self.circuit_open_denied,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time view of the gate, serialized into the `grid_health` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridHealth {
    pub circuit_state: CircuitState,
    pub circuit_open_until: Option<String>,
    pub circuit_reason: Option<String>,
    pub global_remaining: u32,
    pub global_reset_at: String,
    pub run_budget_remaining: Option<u32>,
    pub cached_responses: usize,
    pub debug_counters: CounterSnapshot,
}

#[derive(Debug)]
pub struct Gate {
    clock: Arc<dyn Clock>,
    cache: ResponseCache,
    rate: RateBudget,
    circuit: CircuitBreaker,
    counters: GateCounters,
}

impl Gate {
    pub fn new(settings: GateSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: GateSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: ResponseCache::new(settings.cache_ttl, clock.clone()),
            rate: RateBudget::new(settings.max_requests, settings.window, clock.clone()),
            circuit: CircuitBreaker::new(settings.open_for, clock.clone()),
            counters: GateCounters::default(),
            clock,
        }
    }

    /// Run every pre-flight check for one outbound call.
    ///
    /// The attempt is counted even when a check rejects it; only the check
    /// that rejects bumps its denial counter.
    pub fn admit(&self) -> Result<(), GridError> {
        bump(&self.counters.calls_attempted);
        if let Err(e) = self.circuit.check() {
            bump(&self.counters.circuit_open_denied);
            return Err(e);
        }
        if let Err(e) = acquire_current_run() {
            bump(&self.counters.run_budget_denied);
            return Err(e);
        }
        if let Err(e) = self.rate.acquire() {
            bump(&self.counters.rate_budget_denied);
            return Err(e);
        }
        Ok(())
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn rate_budget(&self) -> &RateBudget {
        &self.rate
    }

    pub fn counters(&self) -> &GateCounters {
        &self.counters
    }

    /// `run_budget_remaining` reflects the run the caller is executing in.
    pub fn health(&self) -> GridHealth {
        let now = self.clock.now();
        GridHealth {
            circuit_state: self.circuit.state(),
            circuit_open_until: self.circuit.open_until().map(|t| wall_time(now, t)),
            circuit_reason: self.circuit.last_reason(),
            global_remaining: self.rate.remaining(),
            global_reset_at: wall_time(now, self.rate.reset_at()),
            run_budget_remaining: current_run_budget().map(|r| r.remaining()),
            cached_responses: self.cache.len(),
            debug_counters: self.counters.snapshot(),
        }
    }

    /// Fresh global budget, closed circuit, empty cache, zeroed counters.
    pub fn reset(&self) {
        self.rate.reset();
        self.circuit.reset();
        self.cache.clear();
        self.counters.reset();
    }
}

/// Project a clock instant onto wall time relative to `Utc::now()`.
///
/// Only approximate: with a manual clock the result is the offset from the
/// clock's `now` applied to the real wall clock.
fn wall_time(now: Instant, at: Instant) -> String {
    let to_chrono =
        |d: Duration| chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
    let ahead = to_chrono(at.saturating_duration_since(now));
    let behind = to_chrono(now.saturating_duration_since(at));
    let t: DateTime<Utc> = Utc::now() + ahead - behind;
    t.to_rfc3339()
}
