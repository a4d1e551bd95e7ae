//! Call budgets.
//!
//! [`RateBudget`] is a process-wide fixed-window counter: it refills to
//! `max_requests` when the window rolls over and rejects once empty, without
//! sleeping. [`RunBudget`] caps calls made by one logical run; it lives in
//! task-local storage, so concurrent runs on a shared gate never see each
//! other's budget.

use super::clock::Clock;
use super::lock;
use crate::error::{GridError, RateScope};
use log::debug;
use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_MAX_REQUESTS: u32 = 15;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    remaining: u32,
    reset_at: Instant,
}

#[derive(Debug)]
pub struct RateBudget {
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<Window>,
}

impl RateBudget {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let reset_at = clock.now() + window;
        Self {
            max_requests,
            window,
            clock,
            state: Mutex::new(Window {
                remaining: max_requests,
                reset_at,
            }),
        }
    }

    pub fn acquire(&self) -> Result<(), GridError> {
        let now = self.clock.now();
        let mut w = lock(&self.state);
        if now >= w.reset_at {
            w.remaining = self.max_requests;
            w.reset_at = now + self.window;
        }
        if w.remaining == 0 {
            debug!("global GRID budget exhausted ({} per {:?})", self.max_requests, self.window);
            return Err(GridError::rate(RateScope::Global, "grid_global_budget_exhausted"));
        }
        w.remaining -= 1;
        Ok(())
    }

    /// Calls left in the current window (not refreshed on read).
    pub fn remaining(&self) -> u32 {
        lock(&self.state).remaining
    }

    pub fn reset_at(&self) -> Instant {
        lock(&self.state).reset_at
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Start a fresh full window from now.
    pub fn reset(&self) {
        let reset_at = self.clock.now() + self.window;
        *lock(&self.state) = Window {
            remaining: self.max_requests,
            reset_at,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunBudget {
    id: Uuid,
    max_requests: u32,
    used: u32,
}

impl RunBudget {
    pub fn new(max_requests: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            max_requests,
            used: 0,
        }
    }

    pub fn acquire(&mut self) -> Result<(), GridError> {
        if self.used >= self.max_requests {
            debug!("run {} exhausted its budget of {}", self.id, self.max_requests);
            return Err(GridError::rate(RateScope::Run, "grid_run_budget_exhausted"));
        }
        self.used += 1;
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.used)
    }
}

tokio::task_local! {
    static CURRENT_RUN: RefCell<RunBudget>;
}

/// Drive `fut` as one run allowed `limit` GRID calls.
///
/// Nested runs shadow the outer budget until they finish.
pub async fn with_run_budget<F: Future>(limit: u32, fut: F) -> F::Output {
    let run = RunBudget::new(limit);
    debug!("run {} started with budget {}", run.id(), limit);
    CURRENT_RUN.scope(RefCell::new(run), fut).await
}

/// Synchronous counterpart of [`with_run_budget`].
pub fn with_run_budget_sync<R>(limit: u32, f: impl FnOnce() -> R) -> R {
    CURRENT_RUN.sync_scope(RefCell::new(RunBudget::new(limit)), f)
}

/// The budget of the run the caller is executing in, if any.
pub fn current_run_budget() -> Option<RunBudget> {
    CURRENT_RUN.try_with(|run| run.borrow().clone()).ok()
}

/// Spend one call from the current run. Outside a run this always passes.
pub(crate) fn acquire_current_run() -> Result<(), GridError> {
    CURRENT_RUN
        .try_with(|run| run.borrow_mut().acquire())
        .unwrap_or(Ok(()))
}
