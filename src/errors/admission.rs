// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed admission rejections.
//!
//! A rejection hands the work item back to the caller so nothing is dropped
//! silently: the producer decides whether to retry, reroute or shed it.

use thiserror::Error;

use crate::admission::WorkItem;
use crate::types::{DependencyId, StageId};

/// Why an admission attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("queue for stage '{stage}' is full ({occupancy}/{capacity})")]
    QueueFull {
        stage: StageId,
        occupancy: usize,
        capacity: usize,
    },

    #[error("circuit '{dependency}' guarding stage '{stage}' is open")]
    CircuitOpenForStage {
        stage: StageId,
        dependency: DependencyId,
    },

    #[error("unknown stage '{0}'")]
    UnknownStage(String),
}

/// A refused admission, carrying the item back to its producer.
#[derive(Debug, Error)]
#[error("work item {} rejected: {reason}", .item.id)]
pub struct Rejected {
    pub item: WorkItem,
    pub reason: RejectReason,
}

impl Rejected {
    pub fn new(item: WorkItem, reason: RejectReason) -> Self {
        Self { item, reason }
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self.reason, RejectReason::QueueFull { .. })
    }

    /// Split the rejection into the returned item and the reason.
    pub fn into_parts(self) -> (WorkItem, RejectReason) {
        (self.item, self.reason)
    }
}
