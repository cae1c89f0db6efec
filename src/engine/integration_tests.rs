// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::admission::{Priority, WorkItem};
use crate::config::{Config, EngineBuilder, StageTopology};
use crate::engine::{EngineSettings, FlowEngine};
use crate::metrics::StageSample;
use crate::traits::{Downstream, DownstreamCall, ManualClock, SystemClock};
use crate::types::{InstanceId, StageId};
use crate::workflow::{InMemoryStore, WorkflowCoordinator};

/// Integration tests for the assembled engine: workers, feedback and the rope
#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitRegistry;

    const ORDER_PIPELINE: &str = r#"
stages:
  - id: intake
    max_throughput: 100
    latency_target_ms: 50
    queue_capacity: 20
    workers: 2
    downstream: [payment]
  - id: payment
    max_throughput: 20
    latency_target_ms: 200
    queue_capacity: 10
    downstream: [fulfillment]
    circuit: payment-gateway
  - id: fulfillment
    max_throughput: 60
    latency_target_ms: 300
    queue_capacity: 20
circuits:
  dependencies:
    - id: payment-gateway
    - id: warehouse
workflows:
  - name: order
    states: [CREATED, PENDING, PAID, SHIPPED, CANCELLED]
    initial: CREATED
    terminal: [SHIPPED, CANCELLED]
    abort_event: CANCEL
    max_retries: 2
    transitions:
      - { from: CREATED, event: CONFIRM, to: PENDING, compensate_with: RELEASE }
      - { from: PENDING, event: PAY_OK, to: PAID, compensate_with: REFUND, dependency: payment-gateway }
      - { from: PAID, event: SHIP, to: SHIPPED, dependency: warehouse }
      - { from: PENDING, event: RELEASE, to: CREATED }
      - { from: PAID, event: REFUND, to: PENDING, dependency: payment-gateway }
      - { from: CREATED, event: CANCEL, to: CANCELLED }
"#;

    /// Fails the first `failures` forward calls, then succeeds.
    struct FlakyDownstream {
        name: &'static str,
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyDownstream {
        fn new(name: &'static str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Downstream for FlakyDownstream {
        async fn invoke(&self, call: &DownstreamCall) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !call.compensation && n < self.failures {
                return Err(format!("{} unavailable", self.name));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn build(gateway: Arc<FlakyDownstream>, warehouse: Arc<FlakyDownstream>) -> FlowEngine {
        EngineBuilder::from_config(Config::from_yaml_str(ORDER_PIPELINE).unwrap())
            .downstream("payment-gateway", gateway)
            .downstream("warehouse", warehouse)
            .build()
            .unwrap()
    }

    async fn wait_for_state(engine: &FlowEngine, id: &InstanceId, expected: &str) {
        for _ in 0..400 {
            if engine.get_state(id).await.unwrap().as_str() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "instance {} never reached {}, still {}",
            id,
            expected,
            engine.get_state(id).await.unwrap()
        );
    }

    async fn stop(token: CancellationToken, handles: Vec<tokio::task::JoinHandle<u64>>) -> u64 {
        token.cancel();
        let mut processed = 0;
        for handle in handles {
            processed += handle.await.unwrap();
        }
        processed
    }

    #[tokio::test]
    async fn test_workers_drive_order_to_completion() {
        let gateway = FlakyDownstream::new("payment-gateway", 0);
        let warehouse = FlakyDownstream::new("warehouse", 0);
        let engine = build(gateway.clone(), warehouse.clone());
        let token = CancellationToken::new();
        let handles = engine.spawn_workers(token.clone());
        assert_eq!(handles.len(), 3);

        let id = InstanceId::new("order-1");
        engine.start_workflow("order", id.clone()).unwrap();

        for (stage, event, state) in [
            ("intake", "CONFIRM", "PENDING"),
            ("payment", "PAY_OK", "PAID"),
            ("fulfillment", "SHIP", "SHIPPED"),
        ] {
            engine
                .admit(WorkItem::new(stage, Priority::Medium, "order-1").for_transition(id.clone(), event))
                .unwrap();
            wait_for_state(&engine, &id, state).await;
        }

        assert_eq!(stop(token, handles).await, 3);
        assert_eq!(gateway.calls(), 1);
        assert_eq!(warehouse.calls(), 1);

        // Worker outcomes reach the metrics on the next tick.
        let report = engine.tick();
        assert!(!report.stale);
        assert!(report.constraint.is_some());
        let payment = engine.snapshot("payment").unwrap();
        assert_eq!(payment.sample_count, 1);
        assert_eq!(payment.error_rate.mean, 0.0);
    }

    #[tokio::test]
    async fn test_failed_action_is_retried_until_it_succeeds() {
        let gateway = FlakyDownstream::new("payment-gateway", 2);
        let engine = build(gateway.clone(), FlakyDownstream::new("warehouse", 0));
        let token = CancellationToken::new();
        let handles = engine.spawn_workers(token.clone());

        let id = InstanceId::new("order-2");
        engine.start_workflow("order", id.clone()).unwrap();
        engine
            .admit(WorkItem::new("intake", Priority::High, "order-2").for_transition(id.clone(), "CONFIRM"))
            .unwrap();
        wait_for_state(&engine, &id, "PENDING").await;

        engine
            .admit(WorkItem::new("payment", Priority::High, "order-2").for_transition(id.clone(), "PAY_OK"))
            .unwrap();
        wait_for_state(&engine, &id, "PAID").await;

        // One CONFIRM, then PAY_OK three times: two failures and the success.
        assert_eq!(stop(token, handles).await, 4);
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_roll_the_order_back() {
        let gateway = FlakyDownstream::new("payment-gateway", usize::MAX);
        let engine = build(gateway.clone(), FlakyDownstream::new("warehouse", 0));
        let token = CancellationToken::new();
        let handles = engine.spawn_workers(token.clone());

        let id = InstanceId::new("order-3");
        engine.start_workflow("order", id.clone()).unwrap();
        engine
            .admit(WorkItem::new("intake", Priority::Low, "order-3").for_transition(id.clone(), "CONFIRM"))
            .unwrap();
        wait_for_state(&engine, &id, "PENDING").await;
        engine
            .admit(WorkItem::new("payment", Priority::Low, "order-3").for_transition(id.clone(), "PAY_OK"))
            .unwrap();
        wait_for_state(&engine, &id, "CANCELLED").await;

        stop(token, handles).await;
        assert_eq!(gateway.calls(), 3);

        let instance = engine.coordinator().snapshot(&id).await.unwrap();
        let path: Vec<&str> = instance.history.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(path, vec!["CONFIRM", "RELEASE", "CANCEL"]);

        engine.tick();
        assert_eq!(engine.snapshot("payment").unwrap().error_rate.mean, 1.0);
    }

    #[tokio::test]
    async fn test_cancel_instance_compensates_in_flight_order() {
        let gateway = FlakyDownstream::new("payment-gateway", 0);
        let engine = build(gateway.clone(), FlakyDownstream::new("warehouse", 0));

        let id = InstanceId::new("order-4");
        engine.start_workflow("order", id.clone()).unwrap();
        engine.apply(&id, &"CONFIRM".into()).await.unwrap();
        engine.apply(&id, &"PAY_OK".into()).await.unwrap();

        let outcome = engine.cancel_instance(&id).await.unwrap();
        assert_eq!(outcome.state().as_str(), "CANCELLED");
        // PAY_OK, then the REFUND compensation.
        assert_eq!(gateway.calls(), 2);

        let last = engine.forget_instance(&id).await.unwrap();
        assert_eq!(last.history.len(), 5);
        assert!(engine.get_state(&id).await.is_err());
    }

    #[test]
    fn test_hysteresis_holds_rope_on_incumbent() {
        let clock = Arc::new(ManualClock::new());
        let engine = EngineBuilder::from_config(Config::from_yaml_str(ORDER_PIPELINE).unwrap())
            .clock(clock.clone())
            .build()
            .unwrap();

        let busy = |utilization: f64| StageSample::new(10.0, Duration::from_millis(10), 0.0, utilization, 0);

        engine.record("payment", busy(0.9)).unwrap();
        engine.record("fulfillment", busy(0.5)).unwrap();
        let first = engine.tick();
        assert_eq!(first.constraint, Some(StageId::new("payment")));
        assert_eq!(first.rate.unwrap().previous, 20.0);

        // Fulfillment edges ahead, but not by more than the margin.
        clock.advance(Duration::from_secs(61));
        engine.record("payment", busy(0.8)).unwrap();
        engine.record("fulfillment", busy(0.9)).unwrap();
        let held = engine.tick();
        assert_eq!(held.constraint, Some(StageId::new("payment")));

        // A decisive lead moves the constraint and restarts the rope at its capacity.
        clock.advance(Duration::from_secs(61));
        engine.record("payment", busy(0.1)).unwrap();
        engine.record("fulfillment", busy(1.0)).unwrap();
        let moved = engine.tick();
        assert_eq!(moved.constraint, Some(StageId::new("fulfillment")));
        assert_eq!(moved.rate.unwrap().previous, 60.0);

        // The limit now covers fulfillment and everything upstream of it.
        for stage in ["intake", "payment", "fulfillment"] {
            assert!(engine.queue_status(stage).unwrap().admission_rate.is_some());
        }
    }

    #[tokio::test]
    async fn test_ticker_runs_on_interval_until_cancelled() {
        let topology = Arc::new(StageTopology::new(
            Config::from_yaml_str(ORDER_PIPELINE).unwrap().stage_specs(),
        ));
        let mut settings = EngineSettings::default();
        settings.analyzer.tick_interval = Duration::from_millis(10);
        let clock = Arc::new(SystemClock);
        let coordinator = Arc::new(WorkflowCoordinator::new(
            Vec::new(),
            Arc::new(InMemoryStore::new()),
            CircuitRegistry::new(Vec::new(), clock.clone()),
        ));
        let engine = Arc::new(FlowEngine::new(topology, settings, coordinator, clock));

        engine
            .record("payment", StageSample::new(19.0, Duration::from_millis(300), 0.1, 0.95, 8))
            .unwrap();

        let token = CancellationToken::new();
        let ticker = engine.spawn_ticker(token.clone());
        for _ in 0..200 {
            if engine.current_constraint().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
        ticker.await.unwrap();

        let current = engine.current_constraint().unwrap();
        assert_eq!(current.stage.as_str(), "payment");
    }
}
