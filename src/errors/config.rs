// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

/// Problems found while validating a configuration.
///
/// Validation accumulates every error it can find so a single load reports
/// the whole list instead of failing on the first one.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The configuration declares no stages at all
    NoStages,
    /// A stage was declared with an empty identifier
    EmptyStageId,
    /// Two stages share the same identifier
    DuplicateStageId { stage_id: String },
    /// A numeric setting that must be strictly positive is not
    NonPositiveValue { field: String, value: f64 },
    /// A numeric setting falls outside its allowed range
    OutOfRange {
        field: String,
        value: f64,
        expected: &'static str,
    },
    /// A stage lists a downstream stage that was never declared
    UnresolvedDownstream {
        stage_id: String,
        missing_stage: String,
    },
    /// The downstream declarations form a cycle
    CyclicTopology {
        /// The cycle path, first and last element identical
        cycle: Vec<String>,
    },
    /// The HIGH-only reserve leaves no slots for other classes
    InvalidHighPriorityReserve {
        stage_id: String,
        reserve: usize,
        capacity: usize,
    },
    /// A score weight is negative
    NegativeWeight { name: &'static str, value: f64 },
    /// Score weights must sum to exactly one
    WeightsDoNotSumToOne { sum: f64 },
    /// The rate floor is above what some stage can sustain
    FloorExceedsStageCapacity {
        stage_id: String,
        floor: f64,
        max_throughput: f64,
    },
    /// Two dependencies share the same identifier
    DuplicateDependencyId { dependency_id: String },
    /// A stage names a circuit dependency that was never declared
    UnresolvedCircuit {
        stage_id: String,
        dependency_id: String,
    },
    /// Two workflows share the same name
    DuplicateWorkflow { workflow: String },
    /// A workflow refers to a state it does not declare
    UnknownState { workflow: String, state: String },
    /// A workflow declares no terminal state
    NoTerminalStates { workflow: String },
    /// A transition leaves a terminal state
    TransitionFromTerminal {
        workflow: String,
        state: String,
        event: String,
    },
    /// The same (state, event) pair appears twice
    DuplicateTransition {
        workflow: String,
        state: String,
        event: String,
    },
    /// A transition calls a dependency that was never declared
    UnresolvedWorkflowDependency {
        workflow: String,
        dependency_id: String,
    },
    /// A compensating event has no transition from the state it must undo
    CompensationNotInTable {
        workflow: String,
        state: String,
        event: String,
    },
    /// A compensating transition neither returns to the source state nor ends the workflow
    CompensationDoesNotUnwind {
        workflow: String,
        event: String,
        expected: String,
        actual: String,
    },
    /// A state where rollback can stop has no abort transition into a terminal state
    MissingAbortTransition { workflow: String, state: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoStages => write!(f, "Configuration declares no stages"),
            ValidationError::EmptyStageId => write!(f, "Stage identifiers must not be empty"),
            ValidationError::DuplicateStageId { stage_id } => {
                write!(f, "Duplicate stage ID: '{}'", stage_id)
            }
            ValidationError::NonPositiveValue { field, value } => {
                write!(f, "'{}' must be positive, got {}", field, value)
            }
            ValidationError::OutOfRange {
                field,
                value,
                expected,
            } => write!(f, "'{}' is {} but must be {}", field, value, expected),
            ValidationError::UnresolvedDownstream {
                stage_id,
                missing_stage,
            } => write!(
                f,
                "Stage '{}' lists downstream '{}' which does not exist",
                stage_id, missing_stage
            ),
            ValidationError::CyclicTopology { cycle } => {
                write!(f, "Cyclic stage topology detected: {}", cycle.join(" -> "))
            }
            ValidationError::InvalidHighPriorityReserve {
                stage_id,
                reserve,
                capacity,
            } => write!(
                f,
                "Stage '{}' reserves {} HIGH-only slots but its capacity is {}",
                stage_id, reserve, capacity
            ),
            ValidationError::NegativeWeight { name, value } => {
                write!(f, "Score weight '{}' is negative: {}", name, value)
            }
            ValidationError::WeightsDoNotSumToOne { sum } => {
                write!(f, "Score weights must sum to 1, got {}", sum)
            }
            ValidationError::FloorExceedsStageCapacity {
                stage_id,
                floor,
                max_throughput,
            } => write!(
                f,
                "Rate floor {} exceeds the max throughput {} of stage '{}'",
                floor, max_throughput, stage_id
            ),
            ValidationError::DuplicateDependencyId { dependency_id } => {
                write!(f, "Duplicate dependency ID: '{}'", dependency_id)
            }
            ValidationError::UnresolvedCircuit {
                stage_id,
                dependency_id,
            } => write!(
                f,
                "Stage '{}' is guarded by circuit '{}' which does not exist",
                stage_id, dependency_id
            ),
            ValidationError::DuplicateWorkflow { workflow } => {
                write!(f, "Duplicate workflow name: '{}'", workflow)
            }
            ValidationError::UnknownState { workflow, state } => write!(
                f,
                "Workflow '{}' refers to undeclared state '{}'",
                workflow, state
            ),
            ValidationError::NoTerminalStates { workflow } => {
                write!(f, "Workflow '{}' declares no terminal states", workflow)
            }
            ValidationError::TransitionFromTerminal {
                workflow,
                state,
                event,
            } => write!(
                f,
                "Workflow '{}' has transition '{}' out of terminal state '{}'",
                workflow, event, state
            ),
            ValidationError::DuplicateTransition {
                workflow,
                state,
                event,
            } => write!(
                f,
                "Workflow '{}' declares ('{}', '{}') more than once",
                workflow, state, event
            ),
            ValidationError::UnresolvedWorkflowDependency {
                workflow,
                dependency_id,
            } => write!(
                f,
                "Workflow '{}' calls dependency '{}' which does not exist",
                workflow, dependency_id
            ),
            ValidationError::CompensationNotInTable {
                workflow,
                state,
                event,
            } => write!(
                f,
                "Workflow '{}' compensates with '{}' but no transition handles it from '{}'",
                workflow, event, state
            ),
            ValidationError::CompensationDoesNotUnwind {
                workflow,
                event,
                expected,
                actual,
            } => write!(
                f,
                "Workflow '{}': compensation '{}' leads to '{}' instead of '{}' or a terminal state",
                workflow, event, actual, expected
            ),
            ValidationError::MissingAbortTransition { workflow, state } => write!(
                f,
                "Workflow '{}' can stop rolling back in '{}' but has no abort transition from it",
                workflow, state
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading configuration. All of them halt startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration validation failed:\n{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_error() {
        let err = ConfigError::Invalid(vec![
            ValidationError::NoStages,
            ValidationError::WeightsDoNotSumToOne { sum: 0.7 },
        ]);
        let text = err.to_string();
        assert!(text.contains("declares no stages"));
        assert!(text.contains("sum to 1, got 0.7"));
    }

    #[test]
    fn test_cycle_display() {
        let err = ValidationError::CyclicTopology {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic stage topology detected: a -> b -> a");
    }
}
