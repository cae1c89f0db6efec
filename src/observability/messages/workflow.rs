// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the workflow coordinator.
//!
//! This module contains message types for logging events related to:
//! * Instance creation and recovery
//! * Applied and rejected transitions
//! * Failed transition actions
//! * Compensation (saga rollback) progress

use crate::errors::ActionFailure;
use crate::observability::messages::{StructuredLog, StructuredSpan};
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A new workflow instance was created in its initial state.
///
/// # Log Level
/// `debug!` - Per-instance detail
pub struct InstanceStarted<'a> {
    pub instance: &'a str,
    pub workflow: &'a str,
    pub state: &'a str,
}

impl Display for InstanceStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Started '{}' instance '{}' in state '{}'",
            self.workflow, self.instance, self.state
        )
    }
}

impl StructuredLog for InstanceStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            instance = self.instance,
            workflow = self.workflow,
            state = self.state,
            "{}", self
        );
    }
}

/// A transition from the table was applied.
///
/// # Log Level
/// `info!` - Important operational event
pub struct TransitionApplied<'a> {
    pub instance: &'a str,
    pub from: &'a str,
    pub event: &'a str,
    pub to: &'a str,
}

impl Display for TransitionApplied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instance '{}': {} --{}--> {}",
            self.instance, self.from, self.event, self.to
        )
    }
}

impl StructuredLog for TransitionApplied<'_> {
    fn log(&self) {
        tracing::info!(
            instance = self.instance,
            from = self.from,
            event = self.event,
            to = self.to,
            "{}", self
        );
    }
}

/// An event not present in the table for the current state.
///
/// # Log Level
/// `warn!` - Caller error, instance unchanged
///
/// # Example
/// ```
/// use the_flowgate::observability::messages::workflow::TransitionRejected;
///
/// let msg = TransitionRejected {
///     instance: "order-42",
///     state: "pending",
///     event: "pay_fail",
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct TransitionRejected<'a> {
    pub instance: &'a str,
    pub state: &'a str,
    pub event: &'a str,
}

impl Display for TransitionRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instance '{}' rejected event '{}' in state '{}'",
            self.instance, self.event, self.state
        )
    }
}

impl StructuredLog for TransitionRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            instance = self.instance,
            state = self.state,
            event = self.event,
            "{}", self
        );
    }
}

/// The side effect of a transition failed; the state did not move.
///
/// # Log Level
/// `warn!` - Transient downstream failure
pub struct ActionFailed<'a> {
    pub instance: &'a str,
    pub state: &'a str,
    pub event: &'a str,
    pub failure: &'a ActionFailure,
}

impl Display for ActionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instance '{}' failed '{}' from '{}': {}",
            self.instance, self.event, self.state, self.failure
        )
    }
}

impl StructuredLog for ActionFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            instance = self.instance,
            state = self.state,
            event = self.event,
            failure = %self.failure,
            "{}", self
        );
    }
}

/// Rollback of completed steps has begun.
///
/// # Log Level
/// `warn!` - Saga is unwinding
pub struct CompensationStarted<'a> {
    pub instance: &'a str,
    pub state: &'a str,
    pub pending_steps: usize,
}

impl Display for CompensationStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compensating instance '{}' from '{}' ({} steps to undo)",
            self.instance, self.state, self.pending_steps
        )
    }
}

impl StructuredLog for CompensationStarted<'_> {
    fn log(&self) {
        tracing::warn!(
            instance = self.instance,
            state = self.state,
            pending_steps = self.pending_steps,
            "{}", self
        );
    }
}

impl StructuredSpan for CompensationStarted<'_> {
    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "compensation",
            span_name = name,
            instance = self.instance,
            state = self.state,
        )
    }
}

/// The instance reached a terminal state after rolling back.
///
/// # Log Level
/// `info!` - Saga finished
pub struct CompensationCompleted<'a> {
    pub instance: &'a str,
    pub final_state: &'a str,
}

impl Display for CompensationCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instance '{}' compensated; final state '{}'",
            self.instance, self.final_state
        )
    }
}

impl StructuredLog for CompensationCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            instance = self.instance,
            final_state = self.final_state,
            "{}", self
        );
    }
}

/// A compensation step could not complete; the instance stays flagged for recovery.
///
/// # Log Level
/// `error!` - Requires a later resume
pub struct CompensationStalled<'a> {
    pub instance: &'a str,
    pub state: &'a str,
    pub failure: &'a ActionFailure,
}

impl Display for CompensationStalled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compensation of instance '{}' stalled in '{}': {}",
            self.instance, self.state, self.failure
        )
    }
}

impl StructuredLog for CompensationStalled<'_> {
    fn log(&self) {
        tracing::error!(
            instance = self.instance,
            state = self.state,
            failure = %self.failure,
            "{}", self
        );
    }
}

/// A finished instance was released from memory and from the store.
///
/// # Log Level
/// `debug!` - Per-instance detail
pub struct InstanceForgotten<'a> {
    pub instance: &'a str,
    pub state: &'a str,
}

impl Display for InstanceForgotten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Forgot instance '{}' finished in '{}'", self.instance, self.state)
    }
}

impl StructuredLog for InstanceForgotten<'_> {
    fn log(&self) {
        tracing::debug!(instance = self.instance, state = self.state, "{}", self);
    }
}

/// An instance was restored from the durable store.
///
/// # Log Level
/// `info!` - Startup recovery
pub struct InstanceRecovered<'a> {
    pub instance: &'a str,
    pub state: &'a str,
    pub compensating: bool,
}

impl Display for InstanceRecovered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.compensating {
            write!(
                f,
                "Recovered instance '{}' in '{}' with rollback pending",
                self.instance, self.state
            )
        } else {
            write!(f, "Recovered instance '{}' in '{}'", self.instance, self.state)
        }
    }
}

impl StructuredLog for InstanceRecovered<'_> {
    fn log(&self) {
        tracing::info!(
            instance = self.instance,
            state = self.state,
            compensating = self.compensating,
            "{}", self
        );
    }
}
