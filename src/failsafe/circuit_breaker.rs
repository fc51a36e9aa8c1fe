//! Per-route circuit breaker
//!
//! # States
//! - Closed: requests pass through; failures are counted in a rolling window
//! - Open: requests fail fast without contacting the backend
//! - Half-Open: exactly one trial request is allowed through
//!
//! # State transitions
//! ```text
//! Closed → Open: failure count reaches threshold within the window
//! Open → Half-Open: after the cooldown elapses
//! Half-Open → Closed: trial request succeeds (counters reset)
//! Half-Open → Open: trial request fails (cooldown restarts)
//! ```
//!
//! All state lives behind a single mutex so that counter updates and
//! transitions are atomic with respect to concurrent requests on the same
//! route; in particular only one request can claim the half-open trial slot.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed (allowing requests)
    Closed,
    /// Circuit is open (blocking requests)
    Open,
    /// Circuit is half-open (single trial in flight or pending)
    HalfOpen,
}

impl CircuitState {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Outcome of asking the breaker for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed with the backend call
    Allowed,
    /// Proceed as the single half-open trial; the caller must report the result
    Trial,
    /// Short-circuit to the fallback
    Rejected,
}

struct BreakerCore {
    state: CircuitState,
    /// Failures observed in the current rolling window (closed state only)
    failures: u32,
    /// Start of the current rolling window
    window_start: Instant,
    /// When the breaker last entered the open state
    opened_at: Instant,
    /// Whether the half-open trial slot has been claimed
    trial_in_flight: bool,
    /// When the current trial claimed the slot
    trial_started: Instant,
}

/// Circuit breaker for one route
pub struct CircuitBreaker {
    /// Route id, for logs and metrics
    name: String,
    enabled: bool,
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for a route
    #[must_use]
    pub fn new(name: &str, config: &CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            name: name.to_string(),
            enabled: config.enabled,
            failure_threshold: config.failure_threshold,
            window: config.window,
            cooldown: config.cooldown,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                failures: 0,
                window_start: now,
                opened_at: now,
                trial_in_flight: false,
                trial_started: now,
            }),
        }
    }

    /// Ask for admission. Must be called once per request before dispatch.
    ///
    /// Returns [`Admission::Trial`] to at most one caller after the cooldown;
    /// that caller is obligated to report the outcome via [`record_success`]
    /// or [`record_failure`].
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    pub fn admit(&self) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if core.opened_at.elapsed() >= self.cooldown {
                    debug!(route = %self.name, "Cooldown elapsed, transitioning to half-open");
                    core.state = CircuitState::HalfOpen;
                    core.trial_in_flight = true;
                    core.trial_started = Instant::now();
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_in_flight {
                    // A trial whose outcome was never reported (the caller
                    // panicked or the request was dropped) must not hold the
                    // slot forever; reclaim it after one cooldown.
                    if core.trial_started.elapsed() >= self.cooldown {
                        warn!(route = %self.name, "Trial never reported, reclaiming trial slot");
                        core.trial_started = Instant::now();
                        Admission::Trial
                    } else {
                        // A trial is already running; everyone else short-circuits.
                        Admission::Rejected
                    }
                } else {
                    core.trial_in_flight = true;
                    core.trial_started = Instant::now();
                    Admission::Trial
                }
            }
        }
    }

    /// Record a successful backend call
    pub fn record_success(&self) {
        if !self.enabled {
            return;
        }

        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                core.failures = 0;
                core.window_start = Instant::now();
            }
            CircuitState::HalfOpen => {
                info!(route = %self.name, "Trial succeeded, closing circuit");
                core.state = CircuitState::Closed;
                core.failures = 0;
                core.window_start = Instant::now();
                core.trial_in_flight = false;
                crate::metrics::breaker_transition(&self.name, CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed backend call (error or timeout)
    pub fn record_failure(&self) {
        if !self.enabled {
            return;
        }

        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                // Rolling window: stale failures do not accumulate forever.
                if core.window_start.elapsed() > self.window {
                    core.failures = 0;
                    core.window_start = Instant::now();
                }
                core.failures += 1;
                if core.failures >= self.failure_threshold {
                    warn!(
                        route = %self.name,
                        failures = core.failures,
                        threshold = self.failure_threshold,
                        "Failure threshold reached, opening circuit"
                    );
                    core.state = CircuitState::Open;
                    core.opened_at = Instant::now();
                    crate::metrics::breaker_transition(&self.name, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(route = %self.name, "Trial failed, reopening circuit");
                core.state = CircuitState::Open;
                core.opened_at = Instant::now(); // cooldown restarts
                core.trial_in_flight = false;
                crate::metrics::breaker_transition(&self.name, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Route id this breaker guards
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
