// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::types::{DependencyId, StageId};

/// Resolved settings of one stage, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub id: StageId,
    /// Declared maximum rate (items per second); caps the rope.
    pub max_throughput: f64,
    pub latency_target: Duration,
    /// Fixed maximum capacity K of the stage's admission queue.
    pub queue_capacity: usize,
    /// Slots only HIGH items may take.
    pub high_priority_reserve: usize,
    pub workers: usize,
    pub downstream: Vec<StageId>,
    /// Dependency whose circuit gates admission into this stage.
    pub circuit: Option<DependencyId>,
}

/// The closed, acyclic set of stages in declaration order.
///
/// Built from a validated configuration; lookups by an unregistered id return
/// `None` rather than panicking.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use the_flowgate::config::{StageSpec, StageTopology};
/// use the_flowgate::types::StageId;
///
/// let spec = |id: &str, downstream: &[&str]| StageSpec {
///     id: StageId::new(id),
///     max_throughput: 100.0,
///     latency_target: Duration::from_millis(200),
///     queue_capacity: 10,
///     high_priority_reserve: 0,
///     workers: 1,
///     downstream: downstream.iter().map(|d| StageId::new(*d)).collect(),
///     circuit: None,
/// };
///
/// let topology = StageTopology::new(vec![
///     spec("intake", &["payment"]),
///     spec("payment", &["shipping"]),
///     spec("shipping", &[]),
/// ]);
///
/// let upstream: Vec<_> = topology.upstream_of("shipping").into_iter().map(|s| s.to_string()).collect();
/// assert_eq!(upstream, vec!["intake", "payment"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StageTopology {
    stages: Vec<StageSpec>,
    index: HashMap<StageId, usize>,
}

impl StageTopology {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        let index = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (stage.id.clone(), i))
            .collect();
        Self { stages, index }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&StageSpec> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Declaration index, used to break ties deterministically.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn downstream_of(&self, id: &str) -> &[StageId] {
        self.get(id).map(|s| s.downstream.as_slice()).unwrap_or(&[])
    }

    /// Every stage from which `id` is reachable, in declaration order.
    ///
    /// The stage itself is not included.
    pub fn upstream_of(&self, id: &str) -> Vec<StageId> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for stage in &self.stages {
            for down in &stage.downstream {
                reverse.entry(down.as_str()).or_default().push(stage.id.as_str());
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = pending.pop_front() {
            for &parent in reverse.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                if parent != id && seen.insert(parent) {
                    pending.push_back(parent);
                }
            }
        }

        self.stages
            .iter()
            .filter(|s| seen.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, downstream: &[&str]) -> StageSpec {
        StageSpec {
            id: StageId::new(id),
            max_throughput: 50.0,
            latency_target: Duration::from_millis(100),
            queue_capacity: 5,
            high_priority_reserve: 0,
            workers: 1,
            downstream: downstream.iter().map(|d| StageId::new(*d)).collect(),
            circuit: None,
        }
    }

    fn diamond() -> StageTopology {
        StageTopology::new(vec![
            spec("intake", &["fraud", "inventory"]),
            spec("fraud", &["payment"]),
            spec("inventory", &["payment"]),
            spec("payment", &["shipping"]),
            spec("shipping", &[]),
        ])
    }

    #[test]
    fn test_upstream_of_diamond() {
        let topology = diamond();
        let upstream: Vec<String> = topology
            .upstream_of("payment")
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(upstream, vec!["intake", "fraud", "inventory"]);
    }

    #[test]
    fn test_upstream_of_source_is_empty() {
        assert!(diamond().upstream_of("intake").is_empty());
    }

    #[test]
    fn test_unknown_stage_lookups() {
        let topology = diamond();
        assert!(topology.get("nope").is_none());
        assert!(topology.downstream_of("nope").is_empty());
        assert!(topology.upstream_of("nope").is_empty());
        assert_eq!(topology.position("payment"), Some(3));
    }
}
