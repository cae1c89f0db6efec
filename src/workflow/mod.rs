// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Saga-style workflow coordination.
//!
//! A [`WorkflowDefinition`] is a static `(state, event) -> next state` table
//! where each step may name the event that undoes it. The
//! [`WorkflowCoordinator`] applies events to [`WorkflowInstance`]s one at a
//! time per instance, calls the step's guarded dependency, and when that call
//! fails walks the history backwards issuing compensations until the instance
//! reaches a terminal state.

mod coordinator;
mod definition;
mod instance;
mod store;


pub use crate::types::{Event, State};
pub use coordinator::{TransitionOutcome, WorkflowCoordinator};
pub use definition::{TransitionRule, WorkflowDefinition};
pub use instance::{RollbackStep, TransitionKind, TransitionRecord, WorkflowInstance};
pub use store::{InMemoryStore, JsonFileStore};
