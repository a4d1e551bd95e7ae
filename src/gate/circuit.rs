//! Circuit breaker in front of GRID.
//!
//! # States
//! - Closed: calls pass through
//! - Open: calls fail fast with the reason that opened the circuit
//!
//! # Transitions
//! ```text
//! Closed → Open: 3 consecutive rate-limited failures, or any lost connection
//! Open → Closed: first check() after open_until
//! ```
//!
//! There is no half-open probe; the circuit closes fully once the cooldown
//! has passed.

use super::clock::Clock;
use super::lock;
use crate::error::GridError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_OPEN_FOR: Duration = Duration::from_secs(600);
pub const RATE_LIMIT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitState {
    Closed,
    Open,
}

/// Classified outcome of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// HTTP 429 or a GraphQL throttle error.
    RateLimited,
    /// TLS handshake failure, unexpected EOF, reset or refused connection.
    ConnectionLost,
    /// Any other non-success HTTP status.
    Status(u16),
    Other,
}

#[derive(Debug, Clone)]
struct Breaker {
    state: CircuitState,
    open_until: Option<Instant>,
    consecutive_rate_limited: u32,
    last_reason: Option<String>,
}

impl Breaker {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            open_until: None,
            consecutive_rate_limited: 0,
            last_reason: None,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    open_for: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Breaker>,
}

impl CircuitBreaker {
    pub fn new(open_for: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            open_for,
            clock,
            inner: Mutex::new(Breaker::closed()),
        }
    }

    pub fn check(&self) -> Result<(), GridError> {
        let now = self.clock.now();
        let mut b = lock(&self.inner);
        if b.state == CircuitState::Open {
            let open_until = b.open_until;
            match open_until {
                Some(until) if now < until => {
                    let reason =
                        b.last_reason.clone().unwrap_or_else(|| "grid_circuit_open".into());
                    return Err(GridError::circuit(reason));
                }
                _ => *b = Breaker::closed(),
            }
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut b = lock(&self.inner);
        b.consecutive_rate_limited = 0;
        if b.state != CircuitState::Open {
            b.last_reason = None;
        }
    }

    pub fn record_failure(&self, failure: Failure) {
        let mut b = lock(&self.inner);
        let reason = match failure {
            Failure::RateLimited => {
                b.consecutive_rate_limited += 1;
                (b.consecutive_rate_limited >= RATE_LIMIT_THRESHOLD).then_some("rate_limit")
            }
            Failure::ConnectionLost => {
                b.consecutive_rate_limited = 0;
                Some("ssl_eof")
            }
            Failure::Status(_) | Failure::Other => {
                b.consecutive_rate_limited = 0;
                None
            }
        };
        if let Some(reason) = reason {
            warn!("GRID circuit opening for {:?} ({})", self.open_for, reason);
            b.state = CircuitState::Open;
            b.open_until = Some(self.clock.now() + self.open_for);
            b.last_reason = Some(reason.to_string());
        }
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.inner).state
    }

    pub fn open_until(&self) -> Option<Instant> {
        let b = lock(&self.inner);
        match b.state {
            CircuitState::Open => b.open_until,
            CircuitState::Closed => None,
        }
    }

    pub fn last_reason(&self) -> Option<String> {
        lock(&self.inner).last_reason.clone()
    }

    pub fn consecutive_rate_limited(&self) -> u32 {
        lock(&self.inner).consecutive_rate_limited
    }

    pub fn reset(&self) {
        *lock(&self.inner) = Breaker::closed();
    }
}
