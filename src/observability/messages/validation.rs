// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration validation.
//!
//! This module contains message types for logging events related to:
//! * Validation lifecycle (start, success, failure)
//! * Cyclic stage topology detection
//! * Individual validation errors

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// Configuration validation started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_flowgate::observability::messages::validation::ValidationStarted;
///
/// let msg = ValidationStarted {
///     stage_count: 3,
///     workflow_count: 1,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ValidationStarted {
    pub stage_count: usize,
    pub workflow_count: usize,
}

impl Display for ValidationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting configuration validation for {} stages and {} workflows",
            self.stage_count, self.workflow_count
        )
    }
}

impl StructuredLog for ValidationStarted {
    fn log(&self) {
        tracing::info!(
            stage_count = self.stage_count,
            workflow_count = self.workflow_count,
            "{}", self
        );
    }
}

/// Configuration validation completed successfully.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ValidationCompleted {
    pub stage_count: usize,
    pub workflow_count: usize,
}

impl Display for ValidationCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Configuration validation completed successfully for {} stages and {} workflows",
            self.stage_count, self.workflow_count
        )
    }
}

impl StructuredLog for ValidationCompleted {
    fn log(&self) {
        tracing::info!(
            stage_count = self.stage_count,
            workflow_count = self.workflow_count,
            "{}", self
        );
    }
}

/// Configuration validation failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_flowgate::observability::messages::validation::ValidationFailed;
///
/// let msg = ValidationFailed {
///     error_count: 3,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ValidationFailed {
    pub error_count: usize,
}

impl Display for ValidationFailed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Configuration validation failed with {} errors",
            self.error_count
        )
    }
}

impl StructuredLog for ValidationFailed {
    fn log(&self) {
        tracing::error!(
            error_count = self.error_count,
            "{}", self
        );
    }
}

/// A single validation problem, logged before the load is aborted.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ValidationProblem<'a> {
    pub error: &'a crate::errors::ValidationError,
}

impl Display for ValidationProblem<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.error)
    }
}

impl StructuredLog for ValidationProblem<'_> {
    fn log(&self) {
        tracing::error!(
            error = %self.error,
            "{}", self
        );
    }
}

/// Cyclic stage topology detected.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct CyclicTopologyDetected<'a> {
    pub cycle: &'a [String],
}

impl Display for CyclicTopologyDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cyclic stage topology detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CyclicTopologyDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_render() {
        let started = ValidationStarted {
            stage_count: 3,
            workflow_count: 1,
        };
        assert_eq!(
            started.to_string(),
            "Starting configuration validation for 3 stages and 1 workflows"
        );

        let cycle = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let msg = CyclicTopologyDetected { cycle: &cycle };
        assert_eq!(msg.to_string(), "Cyclic stage topology detected: a -> b -> a");
    }
}
