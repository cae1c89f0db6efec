// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for bounded admission queues.
//!
//! This module contains message types for logging events related to:
//! * Admission decisions (admitted, rejected)
//! * Dispatch and cancellation of queued items
//! * Priority aging
//! * Effective capacity changes driven by the rope

use crate::errors::RejectReason;
use crate::observability::messages::StructuredLog;
use crate::types::WorkItemId;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Item accepted into a stage queue.
///
/// # Log Level
/// `debug!` - Per-item detail
pub struct ItemAdmitted<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
    pub priority: &'static str,
    pub occupancy: usize,
    pub capacity: usize,
}

impl Display for ItemAdmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Admitted {} item {} into '{}' ({}/{})",
            self.priority, self.item_id, self.stage, self.occupancy, self.capacity
        )
    }
}

impl StructuredLog for ItemAdmitted<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            item_id = %self.item_id,
            priority = self.priority,
            occupancy = self.occupancy,
            capacity = self.capacity,
            "{}", self
        );
    }
}

/// Item refused at admission.
///
/// # Log Level
/// `info!` - Expected outcome, handled by the producer
///
/// # Example
/// ```
/// use the_flowgate::errors::RejectReason;
/// use the_flowgate::observability::messages::admission::ItemRejected;
/// use the_flowgate::types::{StageId, WorkItemId};
///
/// let reason = RejectReason::QueueFull {
///     stage: StageId::new("payment"),
///     occupancy: 5,
///     capacity: 5,
/// };
/// let msg = ItemRejected {
///     stage: "payment",
///     item_id: WorkItemId::new(),
///     reason: &reason,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ItemRejected<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
    pub reason: &'a RejectReason,
}

impl Display for ItemRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected item {} at '{}': {}",
            self.item_id, self.stage, self.reason
        )
    }
}

impl StructuredLog for ItemRejected<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            item_id = %self.item_id,
            reason = %self.reason,
            "{}", self
        );
    }
}

/// Item handed to a stage worker.
///
/// # Log Level
/// `debug!` - Per-item detail
pub struct ItemDispatched<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
    pub priority: &'static str,
    pub waited: Duration,
}

impl Display for ItemDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatched {} item {} from '{}' after {:?}",
            self.priority, self.item_id, self.stage, self.waited
        )
    }
}

impl StructuredLog for ItemDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            item_id = %self.item_id,
            priority = self.priority,
            waited_ms = self.waited.as_millis() as u64,
            "{}", self
        );
    }
}

/// Long-waiting items moved up one priority class.
///
/// # Log Level
/// `debug!` - Starvation prevention detail
pub struct ItemsPromoted<'a> {
    pub stage: &'a str,
    pub promoted: usize,
}

impl Display for ItemsPromoted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Promoted {} aged items in '{}'",
            self.promoted, self.stage
        )
    }
}

impl StructuredLog for ItemsPromoted<'_> {
    fn log(&self) {
        tracing::debug!(stage = self.stage, promoted = self.promoted, "{}", self);
    }
}

/// Queued item removed by its producer before dispatch.
///
/// # Log Level
/// `info!` - Explicit removal
pub struct ItemCancelled<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
}

impl Display for ItemCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cancelled queued item {} in '{}'", self.item_id, self.stage)
    }
}

impl StructuredLog for ItemCancelled<'_> {
    fn log(&self) {
        tracing::info!(stage = self.stage, item_id = %self.item_id, "{}", self);
    }
}

/// Effective queue capacity changed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct CapacityAdjusted<'a> {
    pub stage: &'a str,
    pub previous: usize,
    pub current: usize,
    pub max_capacity: usize,
}

impl Display for CapacityAdjusted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Effective capacity of '{}' changed {} -> {} (max {})",
            self.stage, self.previous, self.current, self.max_capacity
        )
    }
}

impl StructuredLog for CapacityAdjusted<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            previous = self.previous,
            current = self.current,
            max_capacity = self.max_capacity,
            "{}", self
        );
    }
}
