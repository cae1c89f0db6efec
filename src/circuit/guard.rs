// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::consts::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_CIRCUIT_WINDOW_SIZE, DEFAULT_COOL_DOWN_SECS,
    DEFAULT_FAILURE_RATIO_THRESHOLD, DEFAULT_HALF_OPEN_TRIALS,
};
use crate::errors::{CircuitOpen, GuardedCallError};
use crate::observability::messages::circuit::{
    CallDenied, CircuitClosed, CircuitHalfOpened, CircuitOpened,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Clock;
use crate::types::DependencyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitSettings {
    /// The circuit opens when the failure ratio is strictly above this.
    pub failure_ratio_threshold: f64,
    /// Number of most recent calls the ratio is computed over.
    pub window_size: usize,
    /// Denominator floor, so a handful of early failures cannot open the circuit.
    pub minimum_calls: usize,
    pub cool_down: Duration,
    pub half_open_trials: u32,
    pub call_timeout: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: DEFAULT_FAILURE_RATIO_THRESHOLD,
            window_size: DEFAULT_CIRCUIT_WINDOW_SIZE,
            minimum_calls: DEFAULT_CIRCUIT_WINDOW_SIZE,
            cool_down: Duration::from_secs(DEFAULT_COOL_DOWN_SECS),
            half_open_trials: DEFAULT_HALF_OPEN_TRIALS,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

/// Read-only view of a circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub dependency: DependencyId,
    pub state: CircuitState,
    pub calls: usize,
    pub failures: usize,
    pub failure_ratio: f64,
    /// Time since the last state change.
    pub since_change: Duration,
    /// Trial calls still available while half-open.
    pub trials_remaining: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `true` marks a failed call.
    window: VecDeque<bool>,
    changed_at: Instant,
    trials_issued: u32,
    trials_succeeded: u32,
    /// Bumped on every state change; outcomes from an older generation are ignored.
    generation: u64,
}

impl Inner {
    fn failures(&self) -> usize {
        self.window.iter().filter(|&&failed| failed).count()
    }
}

/// Failure-rate circuit breaker for one dependency.
///
/// CLOSED counts outcomes over a sliding window and opens when the failure
/// ratio exceeds the threshold. OPEN denies every call until the cool-down
/// has passed, then becomes HALF_OPEN, which hands out exactly
/// `half_open_trials` permits. One failed trial reopens the circuit and
/// restarts the cool-down; when every trial succeeds the circuit closes with
/// a fresh window.
///
/// The OPEN to HALF_OPEN move happens lazily, the first time the guard is
/// consulted after the cool-down.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use the_flowgate::circuit::{CircuitGuard, CircuitSettings, CircuitState};
/// use the_flowgate::traits::SystemClock;
/// use the_flowgate::types::DependencyId;
///
/// let guard = CircuitGuard::new(
///     DependencyId::new("inventory"),
///     CircuitSettings::default(),
///     Arc::new(SystemClock),
/// );
///
/// let permit = guard.acquire().unwrap();
/// permit.success();
/// assert_eq!(guard.state(), CircuitState::Closed);
/// ```
#[derive(Debug)]
pub struct CircuitGuard {
    dependency: DependencyId,
    settings: CircuitSettings,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl CircuitGuard {
    pub fn new(dependency: DependencyId, settings: CircuitSettings, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            dependency,
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(settings.window_size),
                changed_at: now,
                trials_issued: 0,
                trials_succeeded: 0,
                generation: 0,
            }),
            clock,
        }
    }

    pub fn dependency(&self) -> &DependencyId {
        &self.dependency
    }

    pub fn settings(&self) -> &CircuitSettings {
        &self.settings
    }

    pub fn state(&self) -> CircuitState {
        self.refreshed().state
    }

    /// Whether new work for this dependency should be accepted at all.
    ///
    /// Only an OPEN circuit refuses; this never consumes a trial.
    pub fn admits(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Ask to make one call. Denials are typed, never panics or blocks.
    pub fn acquire(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        let mut inner = self.refreshed();
        let allowed = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen if inner.trials_issued < self.settings.half_open_trials => {
                inner.trials_issued += 1;
                true
            }
            CircuitState::HalfOpen => false,
        };

        if !allowed {
            let state = inner.state;
            drop(inner);
            CallDenied {
                dependency: self.dependency.as_str(),
                state: state.as_str(),
            }
            .log();
            return Err(CircuitOpen {
                dependency: self.dependency.clone(),
                state,
            });
        }

        Ok(CallPermit {
            guard: self,
            generation: inner.generation,
            recorded: false,
        })
    }

    /// Run `call` under a permit with a timeout; a timeout counts as a failure.
    pub async fn call<F, T, E>(&self, timeout: Duration, call: F) -> Result<T, GuardedCallError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().map_err(GuardedCallError::CircuitOpen)?;

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => {
                permit.success();
                Ok(value)
            }
            Ok(Err(error)) => {
                permit.failure();
                Err(GuardedCallError::Failed(error))
            }
            Err(_) => {
                permit.failure();
                Err(GuardedCallError::Timeout(timeout))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn record_success(&self) {
        self.record(None, false);
    }

    #[cfg(test)]
    pub(crate) fn record_failure(&self) {
        self.record(None, true);
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.refreshed();
        let calls = inner.window.len();
        let failures = inner.failures();
        CircuitSnapshot {
            dependency: self.dependency.clone(),
            state: inner.state,
            calls,
            failures,
            failure_ratio: self.ratio(failures, calls),
            since_change: self.clock.now().saturating_duration_since(inner.changed_at),
            trials_remaining: match inner.state {
                CircuitState::HalfOpen => self
                    .settings
                    .half_open_trials
                    .saturating_sub(inner.trials_issued),
                _ => 0,
            },
        }
    }

    fn record(&self, generation: Option<u64>, failed: bool) {
        let now = self.clock.now();
        let mut inner = self.refreshed();
        if generation.map_or(false, |g| g != inner.generation) {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.settings.window_size {
                    inner.window.pop_front();
                }
                let ratio = self.ratio(inner.failures(), inner.window.len());
                if ratio > self.settings.failure_ratio_threshold {
                    self.open(&mut inner, now, ratio);
                }
            }
            CircuitState::HalfOpen if failed => self.open(&mut inner, now, 1.0),
            CircuitState::HalfOpen => {
                inner.trials_succeeded += 1;
                if inner.trials_succeeded >= self.settings.half_open_trials {
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.changed_at = now;
                    inner.generation += 1;
                    CircuitClosed {
                        dependency: self.dependency.as_str(),
                    }
                    .log();
                }
            }
            // Late outcome of a call that started before the circuit opened.
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant, ratio: f64) {
        inner.state = CircuitState::Open;
        inner.window.clear();
        inner.changed_at = now;
        inner.trials_issued = 0;
        inner.trials_succeeded = 0;
        inner.generation += 1;
        CircuitOpened {
            dependency: self.dependency.as_str(),
            failure_ratio: ratio,
            cool_down: self.settings.cool_down,
        }
        .log();
    }

    fn ratio(&self, failures: usize, calls: usize) -> f64 {
        let denominator = calls.max(self.settings.minimum_calls).max(1);
        failures as f64 / denominator as f64
    }

    /// Lock the state, applying a due OPEN to HALF_OPEN move first.
    fn refreshed(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = self.clock.now();
        if inner.state == CircuitState::Open
            && now.saturating_duration_since(inner.changed_at) >= self.settings.cool_down
        {
            inner.state = CircuitState::HalfOpen;
            inner.changed_at = now;
            inner.trials_issued = 0;
            inner.trials_succeeded = 0;
            inner.generation += 1;
            CircuitHalfOpened {
                dependency: self.dependency.as_str(),
                trials: self.settings.half_open_trials,
            }
            .log();
        }
        inner
    }
}

/// Permission to make one call. Report the outcome with [`CallPermit::success`]
/// or [`CallPermit::failure`]; a permit dropped without either counts as a failure.
#[derive(Debug)]
pub struct CallPermit<'a> {
    guard: &'a CircuitGuard,
    generation: u64,
    recorded: bool,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.recorded = true;
        self.guard.record(Some(self.generation), false);
    }

    pub fn failure(mut self) {
        self.recorded = true;
        self.guard.record(Some(self.generation), true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.guard.record(Some(self.generation), true);
        }
    }
}
