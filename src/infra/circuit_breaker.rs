//! Circuit breaker for remote DID resolution
//!
//! Fails fast when a resolver host is down instead of letting every
//! request wait out the full retry budget.
//!
//! # States
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: calls short-circuit with `CircuitOpen` until the reset
//!   timeout elapses
//! - **HalfOpen**: probing; one failure reopens, three consecutive
//!   successes close

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::error::{GatewayError, Result};

/// Consecutive half-open successes required to close the circuit
const SUCCESS_THRESHOLD: u32 = 3;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub max_failures: u32,
    /// Hard ceiling for a single protected call
    pub call_timeout: Duration,
    /// How long the circuit stays open before probing again
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            call_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Call counters, readable without taking the state lock
#[derive(Debug, Default)]
pub struct CircuitBreakerStats {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub rejected: AtomicU64,
    pub times_opened: AtomicU64,
}

struct InternalState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker protecting one remote (one per DID method host).
///
/// State transitions are serialized by a single lock; no I/O happens
/// while it is held.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<InternalState>,
    stats: CircuitBreakerStats,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(InternalState::default()),
            stats: CircuitBreakerStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        let mut state = self.state.lock().await;
        self.maybe_transition(&mut state);
        state.state
    }

    pub fn stats(&self) -> &CircuitBreakerStats {
        &self.stats
    }

    /// Run `fut` under the breaker and its call timeout.
    ///
    /// Open circuit short-circuits with `CircuitOpen` without polling the
    /// future. A timeout counts as a failure and surfaces as `Timeout`.
    pub async fn call<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.admit().await {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::CircuitOpen(self.name.clone()));
        }

        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure().await;
                Err(e)
            }
            Err(_) => {
                self.record_failure().await;
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn admit(&self) -> bool {
        let mut state = self.state.lock().await;
        self.maybe_transition(&mut state);
        !matches!(state.state, CircuitState::Open)
    }

    async fn record_success(&self) {
        self.stats.successes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::Closed => {
                state.failures = 0;
            }
            CircuitState::HalfOpen => {
                state.successes += 1;
                if state.successes >= SUCCESS_THRESHOLD {
                    self.transition_to_closed(&mut state);
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock().await;
        state.last_failure = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                state.failures += 1;
                if state.failures >= self.config.max_failures {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                // A probe failed; the counter restarts from zero
                state.failures = 0;
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {}
        }
    }

    fn maybe_transition(&self, state: &mut InternalState) {
        if state.state == CircuitState::Open {
            let elapsed = state.last_failure.map(|t| t.elapsed());
            if matches!(elapsed, Some(e) if e > self.config.reset_timeout) {
                tracing::info!(circuit = %self.name, "circuit breaker half-open");
                state.state = CircuitState::HalfOpen;
                state.successes = 0;
            }
        }
    }

    fn transition_to_open(&self, state: &mut InternalState) {
        tracing::warn!(
            circuit = %self.name,
            failures = state.failures,
            "circuit breaker opened"
        );
        state.state = CircuitState::Open;
        state.successes = 0;
        self.stats.times_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn transition_to_closed(&self, state: &mut InternalState) {
        tracing::info!(circuit = %self.name, "circuit breaker closed");
        state.state = CircuitState::Closed;
        state.failures = 0;
        state.successes = 0;
        state.last_failure = None;
    }
}

// ============================================================================
// Tests
// ============================================================================
