// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for circuit guards.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Failure ratio exceeded the threshold, or a trial call failed.
///
/// # Log Level
/// `warn!` - Dependency is being shed
///
/// # Example
/// ```
/// use std::time::Duration;
/// use the_flowgate::observability::messages::circuit::CircuitOpened;
///
/// let msg = CircuitOpened {
///     dependency: "payment-gateway",
///     failure_ratio: 0.6,
///     cool_down: Duration::from_secs(30),
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct CircuitOpened<'a> {
    pub dependency: &'a str,
    pub failure_ratio: f64,
    pub cool_down: Duration,
}

impl Display for CircuitOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Circuit '{}' opened at failure ratio {:.2}; cooling down for {:?}",
            self.dependency, self.failure_ratio, self.cool_down
        )
    }
}

impl StructuredLog for CircuitOpened<'_> {
    fn log(&self) {
        tracing::warn!(
            dependency = self.dependency,
            failure_ratio = self.failure_ratio,
            cool_down_ms = self.cool_down.as_millis() as u64,
            "{}", self
        );
    }
}

/// Cool-down elapsed; trial calls are now allowed.
///
/// # Log Level
/// `info!` - Recovery probe
pub struct CircuitHalfOpened<'a> {
    pub dependency: &'a str,
    pub trials: u32,
}

impl Display for CircuitHalfOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Circuit '{}' half-open; allowing {} trial calls",
            self.dependency, self.trials
        )
    }
}

impl StructuredLog for CircuitHalfOpened<'_> {
    fn log(&self) {
        tracing::info!(dependency = self.dependency, trials = self.trials, "{}", self);
    }
}

/// Every trial call succeeded; normal traffic resumes.
///
/// # Log Level
/// `info!` - Recovery complete
pub struct CircuitClosed<'a> {
    pub dependency: &'a str,
}

impl Display for CircuitClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Circuit '{}' closed after successful trials", self.dependency)
    }
}

impl StructuredLog for CircuitClosed<'_> {
    fn log(&self) {
        tracing::info!(dependency = self.dependency, "{}", self);
    }
}

/// A call was denied without reaching the dependency.
///
/// # Log Level
/// `debug!` - Fail-fast detail
pub struct CallDenied<'a> {
    pub dependency: &'a str,
    pub state: &'static str,
}

impl Display for CallDenied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Denied call to '{}' while circuit is {}",
            self.dependency, self.state
        )
    }
}

impl StructuredLog for CallDenied<'_> {
    fn log(&self) {
        tracing::debug!(dependency = self.dependency, state = self.state, "{}", self);
    }
}
