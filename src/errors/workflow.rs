// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;
use thiserror::Error;

use crate::errors::StoreError;
use crate::types::{DependencyId, InstanceId};
use crate::workflow::{Event, State};

/// Rejections returned by the workflow coordinator.
///
/// None of these change the instance: a rejected event leaves state and
/// history exactly as they were.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("unknown workflow instance '{0}'")]
    UnknownInstance(InstanceId),

    #[error("workflow instance '{0}' already exists")]
    DuplicateInstance(InstanceId),

    #[error("event '{event}' is not valid for instance '{instance}' in state '{state}'")]
    InvalidTransition {
        instance: InstanceId,
        state: State,
        event: Event,
    },

    #[error("instance '{0}' is rolling back and accepts no events")]
    CompensationInProgress(InstanceId),

    #[error("instance '{instance}' is still in '{state}' and cannot be forgotten")]
    NotFinished { instance: InstanceId, state: State },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why the side effect attached to a transition did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionFailure {
    #[error("circuit '{0}' is open")]
    CircuitOpen(DependencyId),

    #[error("call to '{dependency}' timed out after {timeout:?}")]
    Timeout {
        dependency: DependencyId,
        timeout: Duration,
    },

    #[error("call to '{dependency}' failed: {message}")]
    Failed {
        dependency: DependencyId,
        message: String,
    },

    #[error("no downstream is bound for dependency '{0}'")]
    Unbound(DependencyId),

    #[error("instance was cancelled while in flight")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ActionFailure> },
}
