// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::StoreError;
use crate::types::InstanceId;
use crate::workflow::WorkflowInstance;

/// Durable storage for workflow instances, keyed by instance id.
///
/// The coordinator saves an instance before committing any change in memory,
/// so whatever a store returns from [`InstanceStore::load_all`] after a crash
/// is a state the instance really reached.
pub trait InstanceStore: Send + Sync {
    fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, StoreError>;

    fn load_all(&self) -> Result<Vec<WorkflowInstance>, StoreError>;

    fn remove(&self, id: &InstanceId) -> Result<(), StoreError>;
}
