// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! Every check runs and every problem is collected, so a single load reports
//! the whole list. The checks run in this order:
//!
//! 1. **Stages**: ids present and unique, numeric settings positive, reserve
//!    smaller than capacity
//! 2. **Topology**: downstream references resolve, then DFS cycle detection
//!    (only when references resolve, since the DFS needs a complete graph)
//! 3. **Control loops**: metrics window, analyzer weights and margin,
//!    admission settings, rope watermarks and factors
//! 4. **Circuits**: settings ranges, unique ids, stage references
//! 5. **Workflows**: table structure, compensation and abort paths, and
//!    dependency references
//!
//! # Example
//! ```rust
//! use the_flowgate::config::{validate_config, Config};
//! use the_flowgate::errors::ValidationError;
//!
//! let config = Config::from_yaml_str(r#"
//! stages:
//!   - { id: a, max_throughput: 10, latency_target_ms: 5, queue_capacity: 4, downstream: [b] }
//!   - { id: b, max_throughput: 10, latency_target_ms: 5, queue_capacity: 4, downstream: [a] }
//! "#).unwrap();
//!
//! let errors = validate_config(&config).unwrap_err();
//! assert!(matches!(&errors[0], ValidationError::CyclicTopology { cycle } if cycle.len() == 3));
//! ```

use std::collections::{HashMap, HashSet};

use crate::circuit::CircuitSettings;
use crate::config::consts::WEIGHT_SUM_TOLERANCE;
use crate::config::Config;
use crate::errors::ValidationError;
use crate::observability::messages::validation::{
    CyclicTopologyDetected, ValidationCompleted, ValidationFailed, ValidationProblem,
    ValidationStarted,
};
use crate::observability::messages::StructuredLog;
use crate::workflow::WorkflowDefinition;

/// Validate a whole configuration.
///
/// Returns every [`ValidationError`] found; an empty list is never returned.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        stage_count: config.stages.len(),
        workflow_count: config.workflows.len(),
    }
    .log();

    let mut errors = Vec::new();
    errors.extend(validate_stages(config));

    let unresolved = validate_downstream_references(config);
    if unresolved.is_empty() {
        errors.extend(validate_acyclic_topology(config));
    } else {
        errors.extend(unresolved);
    }

    errors.extend(validate_metrics(config));
    errors.extend(validate_analyzer(config));
    errors.extend(validate_admission(config));
    errors.extend(validate_rate_controller(config));
    errors.extend(validate_circuits(config));
    errors.extend(validate_workflows(config));

    if errors.is_empty() {
        ValidationCompleted {
            stage_count: config.stages.len(),
            workflow_count: config.workflows.len(),
        }
        .log();
        Ok(())
    } else {
        for error in &errors {
            ValidationProblem { error }.log();
        }
        ValidationFailed {
            error_count: errors.len(),
        }
        .log();
        Err(errors)
    }
}

fn require_positive(errors: &mut Vec<ValidationError>, field: impl Into<String>, value: f64) {
    if !(value > 0.0) {
        errors.push(ValidationError::NonPositiveValue {
            field: field.into(),
            value,
        });
    }
}

fn validate_stages(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.stages.is_empty() {
        errors.push(ValidationError::NoStages);
    }

    let mut seen = HashSet::new();
    for stage in &config.stages {
        if stage.id.trim().is_empty() {
            errors.push(ValidationError::EmptyStageId);
        } else if !seen.insert(stage.id.as_str()) {
            errors.push(ValidationError::DuplicateStageId {
                stage_id: stage.id.clone(),
            });
        }

        let field = |name: &str| format!("stages[{}].{}", stage.id, name);
        require_positive(&mut errors, field("max_throughput"), stage.max_throughput);
        require_positive(&mut errors, field("latency_target_ms"), stage.latency_target_ms as f64);
        require_positive(&mut errors, field("queue_capacity"), stage.queue_capacity as f64);
        if let Some(workers) = stage.workers {
            require_positive(&mut errors, field("workers"), workers as f64);
        }

        let reserve = stage.get_high_priority_reserve();
        if stage.queue_capacity > 0 && reserve >= stage.queue_capacity {
            errors.push(ValidationError::InvalidHighPriorityReserve {
                stage_id: stage.id.clone(),
                reserve,
                capacity: stage.queue_capacity,
            });
        }
    }
    errors
}

fn validate_downstream_references(config: &Config) -> Vec<ValidationError> {
    let ids: HashSet<&str> = config.stages.iter().map(|s| s.id.as_str()).collect();
    let mut errors = Vec::new();
    for stage in &config.stages {
        for downstream in &stage.downstream {
            if !ids.contains(downstream.as_str()) {
                errors.push(ValidationError::UnresolvedDownstream {
                    stage_id: stage.id.clone(),
                    missing_stage: downstream.clone(),
                });
            }
        }
    }
    errors
}

/// DFS with a recursion stack over the downstream edges.
///
/// Stages are visited in declaration order so the reported cycle is stable.
/// The reported path starts and ends at the same stage.
fn validate_acyclic_topology(config: &Config) -> Vec<ValidationError> {
    let graph: HashMap<&str, Vec<&str>> = config
        .stages
        .iter()
        .map(|s| (s.id.as_str(), s.downstream.iter().map(String::as_str).collect()))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in &config.stages {
        if visited.contains(stage.id.as_str()) {
            continue;
        }
        if let Some(cycle) = find_cycle(&stage.id, &graph, &mut visited, &mut rec_stack, &mut path) {
            CyclicTopologyDetected { cycle: &cycle }.log();
            return vec![ValidationError::CyclicTopology { cycle }];
        }
    }
    Vec::new()
}

fn find_cycle<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &next in neighbors {
            if rec_stack.contains(next) {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            if !visited.contains(next) {
                if let Some(cycle) = find_cycle(next, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

fn validate_metrics(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let settings = config.metrics.settings();
    require_positive(&mut errors, "metrics.window_seconds", settings.window.as_secs_f64());
    require_positive(
        &mut errors,
        "metrics.max_samples_per_stage",
        settings.max_samples_per_stage as f64,
    );
    errors
}

fn validate_analyzer(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let settings = config.analyzer.settings();
    let weights = settings.weights;

    for (name, value) in [
        ("utilization", weights.utilization),
        ("error_rate", weights.error_rate),
        ("latency", weights.latency),
        ("backpressure", weights.backpressure),
    ] {
        if value < 0.0 {
            errors.push(ValidationError::NegativeWeight { name, value });
        }
    }
    if (weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        errors.push(ValidationError::WeightsDoNotSumToOne { sum: weights.sum() });
    }

    if !(settings.hysteresis_margin >= 0.0) {
        errors.push(ValidationError::OutOfRange {
            field: "analyzer.hysteresis_margin".to_string(),
            value: settings.hysteresis_margin,
            expected: ">= 0",
        });
    }
    require_positive(
        &mut errors,
        "analyzer.tick_interval_seconds",
        settings.tick_interval.as_secs_f64(),
    );
    errors
}

fn validate_admission(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let admission = &config.admission;
    let settings = admission.settings();

    require_positive(&mut errors, "admission.aging_threshold_ms", settings.aging_threshold.as_secs_f64());
    require_positive(&mut errors, "admission.blocking_timeout_ms", settings.blocking_timeout.as_secs_f64());
    require_positive(&mut errors, "admission.buffer_seconds", settings.buffer_seconds);

    for (class, weight) in ["high", "medium", "low"].iter().zip(admission.get_class_weights()) {
        require_positive(&mut errors, format!("admission.class_weights.{}", class), weight as f64);
    }
    errors
}

fn validate_rate_controller(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let rate = config.rate_controller.settings();

    let watermarks_ok = 0.0 <= rate.low_watermark
        && rate.low_watermark < rate.high_watermark
        && rate.high_watermark <= 1.0;
    if !watermarks_ok {
        errors.push(ValidationError::OutOfRange {
            field: "rate_controller.low_watermark".to_string(),
            value: rate.low_watermark,
            expected: "0 <= low_watermark < high_watermark <= 1",
        });
    }
    if !(rate.damping_factor > 0.0 && rate.damping_factor < 1.0) {
        errors.push(ValidationError::OutOfRange {
            field: "rate_controller.damping_factor".to_string(),
            value: rate.damping_factor,
            expected: "between 0 and 1 (exclusive)",
        });
    }
    if !(rate.growth_factor > 1.0) {
        errors.push(ValidationError::OutOfRange {
            field: "rate_controller.growth_factor".to_string(),
            value: rate.growth_factor,
            expected: "> 1",
        });
    }
    require_positive(&mut errors, "rate_controller.floor", rate.floor);
    if let Some(initial) = rate.initial_rate {
        require_positive(&mut errors, "rate_controller.initial_rate", initial);
    }

    if rate.floor > 0.0 {
        for stage in &config.stages {
            if stage.max_throughput > 0.0 && rate.floor > stage.max_throughput {
                errors.push(ValidationError::FloorExceedsStageCapacity {
                    stage_id: stage.id.clone(),
                    floor: rate.floor,
                    max_throughput: stage.max_throughput,
                });
            }
        }
    }
    errors
}

fn validate_circuit_settings(errors: &mut Vec<ValidationError>, scope: &str, settings: &CircuitSettings) {
    let field = |name: &str| format!("{}.{}", scope, name);

    if !(settings.failure_ratio_threshold > 0.0 && settings.failure_ratio_threshold <= 1.0) {
        errors.push(ValidationError::OutOfRange {
            field: field("failure_ratio_threshold"),
            value: settings.failure_ratio_threshold,
            expected: "in (0, 1]",
        });
    }
    require_positive(errors, field("window_size"), settings.window_size as f64);
    if settings.minimum_calls == 0 || settings.minimum_calls > settings.window_size {
        errors.push(ValidationError::OutOfRange {
            field: field("minimum_calls"),
            value: settings.minimum_calls as f64,
            expected: "between 1 and window_size",
        });
    }
    require_positive(errors, field("half_open_trials"), settings.half_open_trials as f64);
    require_positive(errors, field("cool_down_ms"), settings.cool_down.as_secs_f64());
    require_positive(errors, field("call_timeout_ms"), settings.call_timeout.as_secs_f64());
}

fn validate_circuits(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for dependency in &config.circuits.dependencies {
        if !seen.insert(dependency.id.as_str()) {
            errors.push(ValidationError::DuplicateDependencyId {
                dependency_id: dependency.id.clone(),
            });
        }
    }
    for (id, settings) in config.circuit_settings() {
        validate_circuit_settings(&mut errors, &format!("circuits[{}]", id), &settings);
    }

    for stage in &config.stages {
        if let Some(circuit) = &stage.circuit {
            if !seen.contains(circuit.as_str()) {
                errors.push(ValidationError::UnresolvedCircuit {
                    stage_id: stage.id.clone(),
                    dependency_id: circuit.clone(),
                });
            }
        }
    }
    errors
}

fn validate_workflows(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let dependencies: HashSet<&str> = config
        .circuits
        .dependencies
        .iter()
        .map(|d| d.id.as_str())
        .collect();

    let mut names = HashSet::new();
    for workflow in &config.workflows {
        if !names.insert(workflow.name.as_str()) {
            errors.push(ValidationError::DuplicateWorkflow {
                workflow: workflow.name.clone(),
            });
        }

        if let Err(table_errors) = WorkflowDefinition::from_config(workflow) {
            errors.extend(table_errors);
        }

        let mut reported = HashSet::new();
        for transition in &workflow.transitions {
            if let Some(dependency) = &transition.dependency {
                if !dependencies.contains(dependency.as_str()) && reported.insert(dependency.as_str()) {
                    errors.push(ValidationError::UnresolvedWorkflowDependency {
                        workflow: workflow.name.clone(),
                        dependency_id: dependency.clone(),
                    });
                }
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap()
    }

    const VALID: &str = r#"
stages:
  - { id: intake, max_throughput: 100, latency_target_ms: 50, queue_capacity: 20, downstream: [payment] }
  - { id: payment, max_throughput: 40, latency_target_ms: 200, queue_capacity: 10, circuit: payment-gateway }
circuits:
  dependencies:
    - id: payment-gateway
workflows:
  - name: order
    states: [created, pending, paid, cancelled]
    initial: created
    terminal: [paid, cancelled]
    abort_event: cancel
    transitions:
      - { from: created, event: confirm, to: pending, compensate_with: release }
      - { from: pending, event: pay_ok, to: paid, dependency: payment-gateway }
      - { from: pending, event: release, to: created }
      - { from: created, event: cancel, to: cancelled }
"#;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&config(VALID)).is_ok());
    }

    #[test]
    fn test_stage_problems_accumulate() {
        let yaml = r#"
stages:
  - { id: a, max_throughput: 0, latency_target_ms: 10, queue_capacity: 5, high_priority_reserve: 5 }
  - { id: a, max_throughput: 10, latency_target_ms: 0, queue_capacity: 0 }
  - { id: "", max_throughput: 10, latency_target_ms: 10, queue_capacity: 3 }
rate_controller:
  floor: 0.5
"#;
        let errors = validate_config(&config(yaml)).unwrap_err();

        assert!(errors.contains(&ValidationError::DuplicateStageId { stage_id: "a".into() }));
        assert!(errors.contains(&ValidationError::EmptyStageId));
        assert!(errors.contains(&ValidationError::InvalidHighPriorityReserve {
            stage_id: "a".into(),
            reserve: 5,
            capacity: 5,
        }));
        let non_positive: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::NonPositiveValue { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            non_positive,
            vec!["stages[a].max_throughput", "stages[a].latency_target_ms", "stages[a].queue_capacity"]
        );
    }

    #[test]
    fn test_unresolved_downstream_skips_cycle_check() {
        let yaml = r#"
stages:
  - { id: a, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5, downstream: [ghost, a] }
"#;
        let errors = validate_config(&config(yaml)).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnresolvedDownstream {
                stage_id: "a".into(),
                missing_stage: "ghost".into(),
            }]
        );
    }

    #[test]
    fn test_cycle_path_reported() {
        let yaml = r#"
stages:
  - { id: a, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5, downstream: [b] }
  - { id: b, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5, downstream: [c] }
  - { id: c, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5, downstream: [b] }
"#;
        let errors = validate_config(&config(yaml)).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicTopology {
                cycle: vec!["b".into(), "c".into(), "b".into()],
            }]
        );
    }

    #[test]
    fn test_control_loop_ranges() {
        let yaml = r#"
stages:
  - { id: a, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5 }
analyzer:
  weights: { utilization: 0.7, error_rate: -0.1, latency: 0.2, backpressure: 0.1 }
  hysteresis_margin: -0.5
rate_controller:
  low_watermark: 0.9
  high_watermark: 0.3
  damping_factor: 1.5
  growth_factor: 0.9
  floor: 20
admission:
  buffer_seconds: 0
"#;
        let errors = validate_config(&config(yaml)).unwrap_err();

        assert!(errors.contains(&ValidationError::NegativeWeight { name: "error_rate", value: -0.1 }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::WeightsDoNotSumToOne { .. })));
        let out_of_range: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::OutOfRange { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            out_of_range,
            vec![
                "analyzer.hysteresis_margin",
                "rate_controller.low_watermark",
                "rate_controller.damping_factor",
                "rate_controller.growth_factor",
            ]
        );
        assert!(errors.contains(&ValidationError::FloorExceedsStageCapacity {
            stage_id: "a".into(),
            floor: 20.0,
            max_throughput: 10.0,
        }));
        assert!(errors.contains(&ValidationError::NonPositiveValue {
            field: "admission.buffer_seconds".into(),
            value: 0.0,
        }));
    }

    #[test]
    fn test_circuit_problems() {
        let yaml = r#"
stages:
  - { id: a, max_throughput: 10, latency_target_ms: 10, queue_capacity: 5, circuit: mailer }
circuits:
  dependencies:
    - id: warehouse
      window_size: 5
      minimum_calls: 8
    - id: warehouse
      failure_ratio_threshold: 0
"#;
        let errors = validate_config(&config(yaml)).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateDependencyId {
            dependency_id: "warehouse".into()
        }));
        assert!(errors.contains(&ValidationError::UnresolvedCircuit {
            stage_id: "a".into(),
            dependency_id: "mailer".into(),
        }));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::OutOfRange { field, .. } if field == "circuits[warehouse].minimum_calls"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::OutOfRange { field, .. } if field == "circuits[warehouse].failure_ratio_threshold"
        )));
    }

    #[test]
    fn test_workflow_problems() {
        let yaml = VALID.replace("dependency: payment-gateway", "dependency: bank")
            .replace("      - { from: created, event: cancel, to: cancelled }\n", "");
        let errors = validate_config(&config(&yaml)).unwrap_err();

        assert!(errors.contains(&ValidationError::UnresolvedWorkflowDependency {
            workflow: "order".into(),
            dependency_id: "bank".into(),
        }));
        assert!(errors.contains(&ValidationError::MissingAbortTransition {
            workflow: "order".into(),
            state: "created".into(),
        }));
    }
}
