// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use the_flowgate::admission::{AdmissionQueue, AdmissionSettings, Priority, WorkItem};
use the_flowgate::circuit::{CircuitGuard, CircuitRegistry, CircuitSettings, CircuitState};
use the_flowgate::config::{StageSpec, StageTopology, WorkflowConfig};
use the_flowgate::constraint::{AnalyzerSettings, ConstraintAnalyzer, ScoreWeights};
use the_flowgate::errors::TransitionError;
use the_flowgate::metrics::{MetricsAggregator, MetricsSettings, StageSample};
use the_flowgate::rate::{RateController, RateSettings};
use the_flowgate::traits::{ManualClock, SystemClock};
use the_flowgate::types::{DependencyId, Event, InstanceId, StageId};
use the_flowgate::workflow::{InMemoryStore, WorkflowCoordinator, WorkflowDefinition};

fn stage(id: &str, capacity: usize) -> StageSpec {
    StageSpec {
        id: StageId::new(id),
        max_throughput: 100.0,
        latency_target: Duration::from_millis(100),
        queue_capacity: capacity,
        high_priority_reserve: 0,
        workers: 1,
        downstream: Vec::new(),
        circuit: None,
    }
}

/// Scenario 1: a full queue rejects instead of growing
fn queue_rejects_when_full() -> Result<()> {
    println!("=== 1. Bounded admission (K=5) ===\n");
    let queue = AdmissionQueue::new(&stage("payment", 5), AdmissionSettings::default(), None, Arc::new(SystemClock));

    for n in 1..=6 {
        match queue.admit(WorkItem::new("payment", Priority::High, format!("order-{}", n).as_str())) {
            Ok(admitted) => println!("  admitted #{} -> occupancy {}/{}", n, admitted.occupancy, admitted.capacity),
            Err(rejected) => println!("  rejected #{}: {}", n, rejected.reason),
        }
    }
    println!("  final occupancy: {}", queue.occupancy());
    Ok(())
}

/// Scenario 2: hysteresis keeps the incumbent constraint
fn hysteresis_keeps_incumbent() -> Result<()> {
    println!("\n=== 2. Constraint hysteresis (margin 0.1) ===\n");
    let clock = Arc::new(ManualClock::new());
    let topology = Arc::new(StageTopology::new(vec![stage("A", 10), stage("B", 10)]));
    let settings = AnalyzerSettings {
        // Utilization alone decides the score, so the scores read directly.
        weights: ScoreWeights {
            utilization: 1.0,
            error_rate: 0.0,
            latency: 0.0,
            backpressure: 0.0,
        },
        ..AnalyzerSettings::default()
    };
    let metrics = MetricsAggregator::new(topology.ids(), MetricsSettings::default(), clock.clone());
    let analyzer = ConstraintAnalyzer::new(Arc::clone(&topology), settings, clock.clone());
    let busy = |utilization: f64| StageSample::new(50.0, Duration::from_millis(10), 0.0, utilization, 0);

    metrics.record("A", busy(0.5))?;
    metrics.record("B", busy(0.85))?;
    let first = analyzer.analyze(&metrics.snapshot_all());
    let incumbent = first.current().map(|c| c.stage.to_string()).unwrap_or_default();
    println!("  tick 1: A=0.50 B=0.85 -> constraint {}", incumbent);

    clock.advance(Duration::from_secs(61));
    metrics.record("A", busy(0.9))?;
    metrics.record("B", busy(0.85))?;
    let second = analyzer.analyze(&metrics.snapshot_all());
    let held = second.current().map(|c| c.stage.to_string()).unwrap_or_default();
    println!("  tick 2: A=0.90 B=0.85 -> constraint {} (lead 0.05 is within the margin)", held);
    Ok(())
}

/// Scenario 3: the circuit opens, cools down, trials once, and reopens
fn circuit_cycle() -> Result<()> {
    println!("\n=== 3. Circuit guard (50% over 10 calls) ===\n");
    let clock = Arc::new(ManualClock::new());
    let settings = CircuitSettings {
        failure_ratio_threshold: 0.5,
        window_size: 10,
        minimum_calls: 10,
        cool_down: Duration::from_secs(30),
        half_open_trials: 1,
        call_timeout: Duration::from_secs(2),
    };
    let guard = CircuitGuard::new(DependencyId::new("payment-gateway"), settings, clock.clone());

    for _ in 0..6 {
        guard.acquire()?.failure();
    }
    match guard.acquire() {
        Err(denied) => println!("  after 6 failures: {}", denied),
        Ok(_) => return Err(anyhow!("circuit should be open")),
    }

    clock.advance(Duration::from_secs(30));
    println!("  after cool-down: {}", guard.state().as_str());
    let trial = guard.acquire()?;
    println!("  second trial allowed: {}", guard.acquire().is_ok());
    trial.failure();

    let state = guard.state();
    println!("  failed trial -> {}", state.as_str());
    if state != CircuitState::Open {
        return Err(anyhow!("failed trial should reopen the circuit"));
    }
    Ok(())
}

/// Scenario 4: an event outside the table is rejected without changing state
async fn workflow_rejects_unknown_event() -> Result<()> {
    println!("\n=== 4. Workflow transition table ===\n");
    let config: WorkflowConfig = serde_yaml::from_str(
        r#"
name: order
states: [CREATED, PENDING, PAID, CANCELLED]
initial: CREATED
terminal: [PAID, CANCELLED]
abort_event: CANCEL
transitions:
  - { from: CREATED, event: CONFIRM, to: PENDING, compensate_with: RELEASE }
  - { from: PENDING, event: PAY_OK, to: PAID }
  - { from: PENDING, event: RELEASE, to: CREATED }
  - { from: CREATED, event: CANCEL, to: CANCELLED }
"#,
    )?;
    let definition = WorkflowDefinition::from_config(&config)
        .map_err(|errors| anyhow!("invalid workflow: {:?}", errors))?;
    let coordinator = WorkflowCoordinator::new(
        vec![definition],
        Arc::new(InMemoryStore::new()),
        CircuitRegistry::new(Vec::new(), Arc::new(SystemClock)),
    );

    let id = InstanceId::new("order-42");
    coordinator.start("order", id.clone())?;
    let outcome = coordinator.apply(&id, &Event::new("CONFIRM")).await?;
    println!("  CONFIRM -> {}", outcome.state());

    match coordinator.apply(&id, &Event::new("PAY_FAIL")).await {
        Err(e @ TransitionError::InvalidTransition { .. }) => println!("  PAY_FAIL -> {}", e),
        other => return Err(anyhow!("expected InvalidTransition, got {:?}", other)),
    }
    println!("  state is still {}", coordinator.get_state(&id).await?);
    Ok(())
}

/// Scenario 5: the rope damps above the high watermark and holds inside the band
fn rope_damps_and_holds() -> Result<()> {
    println!("\n=== 5. Rope rate controller ===\n");
    let rope = RateController::new(RateSettings::default(), 1000.0);

    let damped = rope.tick("payment", 1000.0, 0.95);
    println!("  occupancy 0.95: {} -> {} ({:?})", damped.previous, damped.rate, damped.adjustment);
    let held = rope.tick("payment", 1000.0, 0.5);
    println!("  occupancy 0.50: {} -> {} ({:?})", held.previous, held.rate, held.adjustment);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("🚦 Flowgate scenarios\n");
    queue_rejects_when_full()?;
    hysteresis_keeps_incumbent()?;
    circuit_cycle()?;
    workflow_rejects_unknown_event().await?;
    rope_damps_and_holds()?;
    println!("\n🎉 All scenarios complete");
    Ok(())
}
