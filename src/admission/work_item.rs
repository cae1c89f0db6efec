// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::types::{InstanceId, StageId, WorkItemId};
use crate::workflow::{Event, State};

/// Priority class of a work item. `High` is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Classes from highest to lowest.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// One class up; `High` stays `High`.
    pub fn promoted(self) -> Priority {
        match self {
            Priority::High | Priority::Medium => Priority::High,
            Priority::Low => Priority::Medium,
        }
    }

    /// Lane index, 0 for `High`.
    pub fn rank(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to the payload a work item carries (a key, a URI, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(pub String);

impl From<&str> for PayloadRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A unit of work moving through a stage.
///
/// The item is owned by exactly one party at a time: the producer until it is
/// admitted, the queue while it waits, then the worker that dispatched it.
/// A rejection hands it back to the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub stage: StageId,
    pub priority: Priority,
    pub payload: PayloadRef,
    /// Workflow instance this item advances, if any.
    pub instance: Option<InstanceId>,
    /// Event to apply to `instance` when the item is processed.
    pub event: Option<Event>,
    /// Last known state of `instance`.
    pub workflow_state: Option<State>,
    pub retry_count: u32,
    /// Set by the queue at admission.
    pub enqueued_at: Option<Instant>,
}

impl WorkItem {
    pub fn new(stage: impl Into<StageId>, priority: Priority, payload: impl Into<PayloadRef>) -> Self {
        Self {
            id: WorkItemId::new(),
            stage: stage.into(),
            priority,
            payload: payload.into(),
            instance: None,
            event: None,
            workflow_state: None,
            retry_count: 0,
            enqueued_at: None,
        }
    }

    /// Attach the workflow transition this item drives.
    pub fn for_transition(mut self, instance: impl Into<InstanceId>, event: impl Into<Event>) -> Self {
        self.instance = Some(instance.into());
        self.event = Some(event.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_promotion_stops_at_high() {
        assert_eq!(Priority::Low.promoted(), Priority::Medium);
        assert_eq!(Priority::Medium.promoted(), Priority::High);
        assert_eq!(Priority::High.promoted(), Priority::High);
    }

    #[test]
    fn test_priority_ordering_puts_high_first() {
        let mut classes = vec![Priority::Low, Priority::High, Priority::Medium];
        classes.sort();
        assert_eq!(classes, Priority::ALL.to_vec());
    }

    #[test]
    fn test_new_item_is_unqueued() {
        let item = WorkItem::new("payment", Priority::Low, "order-1").for_transition("order-1", "pay_ok");
        assert_eq!(item.stage.as_str(), "payment");
        assert_eq!(item.retry_count, 0);
        assert!(item.enqueued_at.is_none());
        assert_eq!(item.event.as_ref().map(|e| e.as_str()), Some("pay_ok"));
    }
}
