// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::types::{DependencyId, InstanceId};
use crate::workflow::{Event, State};

/// Description of a single call a transition makes to a guarded dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamCall {
    pub dependency: DependencyId,
    pub instance: InstanceId,
    pub from: State,
    pub event: Event,
    /// True when the call is part of a compensation (rollback) step.
    pub compensation: bool,
}

/// A dependency invoked while a workflow transition is being applied.
///
/// Implementations perform the side effect for the transition (charge a card,
/// reserve stock, ...). Returning `Err` makes the coordinator treat the
/// transition as failed; the error text is carried into the outcome.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn invoke(&self, call: &DownstreamCall) -> Result<(), String>;

    fn name(&self) -> &str;
}
