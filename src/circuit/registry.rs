// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use crate::circuit::guard::{CircuitGuard, CircuitSettings, CircuitSnapshot, CircuitState};
use crate::errors::UnknownDependency;
use crate::traits::Clock;
use crate::types::DependencyId;

/// One guard per declared dependency. The set is closed at construction.
#[derive(Debug, Default, Clone)]
pub struct CircuitRegistry {
    order: Vec<DependencyId>,
    guards: HashMap<DependencyId, Arc<CircuitGuard>>,
}

impl CircuitRegistry {
    pub fn new<I>(dependencies: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (DependencyId, CircuitSettings)>,
    {
        let mut registry = Self::default();
        for (dependency, settings) in dependencies {
            let guard = Arc::new(CircuitGuard::new(dependency.clone(), settings, Arc::clone(&clock)));
            registry.order.push(dependency.clone());
            registry.guards.insert(dependency, guard);
        }
        registry
    }

    pub fn get(&self, dependency: &str) -> Result<Arc<CircuitGuard>, UnknownDependency> {
        self.guards
            .get(dependency)
            .cloned()
            .ok_or_else(|| UnknownDependency(dependency.to_string()))
    }

    pub fn state(&self, dependency: &str) -> Result<CircuitState, UnknownDependency> {
        self.get(dependency).map(|guard| guard.state())
    }

    pub fn snapshot(&self, dependency: &str) -> Result<CircuitSnapshot, UnknownDependency> {
        self.get(dependency).map(|guard| guard.snapshot())
    }

    /// Snapshots of every guard, in declaration order.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.guards.get(id))
            .map(|guard| guard.snapshot())
            .collect()
    }

    pub fn ids(&self) -> &[DependencyId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
