// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded admission queues with priority classes and aging.

mod lanes;
mod queue;
mod work_item;

pub use lanes::{ClassOrdering, PriorityLanes, QueuedItem};
pub use queue::{AdmissionQueue, AdmissionSettings, Admitted, QueueStatus};
pub use work_item::{PayloadRef, Priority, WorkItem};
