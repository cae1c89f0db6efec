// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admission::{AdmissionQueue, AdmissionSettings, Admitted, QueueStatus, WorkItem};
use crate::circuit::{CircuitRegistry, CircuitSnapshot, CircuitState};
use crate::config::StageTopology;
use crate::constraint::{AnalyzerSettings, ConstraintAnalyzer, CurrentConstraint, Ranking};
use crate::engine::feedback::OutcomeTally;
use crate::engine::worker::StageWorker;
use crate::errors::{RejectReason, Rejected, TransitionError, UnknownDependency, UnknownStage};
use crate::metrics::{MetricsAggregator, MetricsSettings, StageMetrics, StageSample};
use crate::observability::messages::engine::{EngineStarted, TickCompleted};
use crate::observability::messages::metrics::UnknownStageReported;
use crate::observability::messages::StructuredLog;
use crate::rate::{RateController, RateDecision, RateSettings};
use crate::traits::{Clock, Downstream};
use crate::types::{DependencyId, Event, InstanceId, StageId, State, WorkItemId};
use crate::workflow::{TransitionOutcome, WorkflowCoordinator, WorkflowInstance};

/// Tuning for every control loop the engine runs.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub metrics: MetricsSettings,
    pub analyzer: AnalyzerSettings,
    pub admission: AdmissionSettings,
    pub rate: RateSettings,
}

/// What one control tick decided.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub constraint: Option<StageId>,
    pub rate: Option<RateDecision>,
    /// No stage had fresh samples; the previous ranking was kept.
    pub stale: bool,
}

#[derive(Debug)]
struct Rope {
    controller: RateController,
    /// Stage the current rate was computed for.
    target: Option<StageId>,
}

/// The assembled engine: metrics, constraint analysis, admission queues,
/// rope control, circuit guards and workflow coordination behind one handle.
///
/// Build one with [`crate::config::EngineBuilder`].
pub struct FlowEngine {
    topology: Arc<StageTopology>,
    settings: EngineSettings,
    metrics: MetricsAggregator,
    analyzer: ConstraintAnalyzer,
    queues: HashMap<StageId, Arc<AdmissionQueue>>,
    rope: Mutex<Rope>,
    circuits: CircuitRegistry,
    coordinator: Arc<WorkflowCoordinator>,
    feedback: Arc<OutcomeTally>,
    clock: Arc<dyn Clock>,
}

impl FlowEngine {
    pub fn new(
        topology: Arc<StageTopology>,
        settings: EngineSettings,
        coordinator: Arc<WorkflowCoordinator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let circuits = coordinator.circuits().clone();

        let queues = topology
            .stages()
            .iter()
            .map(|spec| {
                let guard = spec
                    .circuit
                    .as_ref()
                    .and_then(|dependency| circuits.get(dependency.as_str()).ok());
                let queue = AdmissionQueue::new(spec, settings.admission, guard, Arc::clone(&clock));
                (spec.id.clone(), Arc::new(queue))
            })
            .collect();

        let feedback = OutcomeTally::new(
            topology.stages().iter().map(|s| (s.id.clone(), s.workers)),
            Arc::clone(&clock),
        );

        let initial_rate = topology
            .stages()
            .iter()
            .map(|s| s.max_throughput)
            .fold(f64::INFINITY, f64::min);
        let rope = Rope {
            controller: RateController::new(settings.rate, initial_rate),
            target: None,
        };

        EngineStarted {
            stage_count: topology.len(),
            workflow_count: coordinator.workflow_count(),
            dependency_count: circuits.len(),
        }
        .log();

        Self {
            metrics: MetricsAggregator::new(topology.ids(), settings.metrics, Arc::clone(&clock)),
            analyzer: ConstraintAnalyzer::new(Arc::clone(&topology), settings.analyzer, Arc::clone(&clock)),
            topology,
            settings,
            queues,
            rope: Mutex::new(rope),
            circuits,
            coordinator,
            feedback: Arc::new(feedback),
            clock,
        }
    }

    pub fn topology(&self) -> &StageTopology {
        &self.topology
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &Arc<WorkflowCoordinator> {
        &self.coordinator
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    // ---- metrics and constraint ----

    pub fn record(&self, stage: &str, sample: StageSample) -> Result<(), UnknownStage> {
        self.metrics.record(stage, sample)
    }

    pub fn snapshot(&self, stage: &str) -> Result<StageMetrics, UnknownStage> {
        self.metrics.snapshot(stage)
    }

    pub fn current_constraint(&self) -> Option<CurrentConstraint> {
        self.analyzer.current()
    }

    pub fn ranking(&self) -> Option<Arc<Ranking>> {
        self.analyzer.ranking()
    }

    /// The rope's current admission rate.
    pub fn admission_rate(&self) -> f64 {
        self.lock_rope().controller.rate()
    }

    // ---- admission ----

    pub fn admit(&self, item: WorkItem) -> Result<Admitted, Rejected> {
        match self.queues.get(item.stage.as_str()) {
            Some(queue) => queue.admit(item),
            None => Err(unknown_stage(item)),
        }
    }

    pub async fn admit_blocking(&self, item: WorkItem, timeout: Option<Duration>) -> Result<Admitted, Rejected> {
        match self.queues.get(item.stage.as_str()) {
            Some(queue) => queue.admit_blocking(item, timeout).await,
            None => Err(unknown_stage(item)),
        }
    }

    pub fn dispatch(&self, stage: &str) -> Result<Option<WorkItem>, UnknownStage> {
        Ok(self.queue(stage)?.dispatch())
    }

    /// Remove a queued item from whichever stage holds it.
    pub fn cancel(&self, id: WorkItemId) -> Option<WorkItem> {
        self.topology
            .ids()
            .iter()
            .filter_map(|stage| self.queues.get(stage))
            .find_map(|queue| queue.cancel(id))
    }

    pub fn queue_status(&self, stage: &str) -> Result<QueueStatus, UnknownStage> {
        Ok(self.queue(stage)?.status())
    }

    /// Status of every queue, in declaration order.
    pub fn queue_statuses(&self) -> Vec<QueueStatus> {
        self.topology
            .ids()
            .iter()
            .filter_map(|stage| self.queues.get(stage))
            .map(|queue| queue.status())
            .collect()
    }

    fn queue(&self, stage: &str) -> Result<&Arc<AdmissionQueue>, UnknownStage> {
        self.queues
            .get(stage)
            .ok_or_else(|| UnknownStage(stage.to_string()))
    }

    // ---- circuits ----

    pub fn circuit_state(&self, dependency: &str) -> Result<CircuitState, UnknownDependency> {
        self.circuits.state(dependency)
    }

    pub fn circuit_snapshot(&self, dependency: &str) -> Result<CircuitSnapshot, UnknownDependency> {
        self.circuits.snapshot(dependency)
    }

    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.circuits.snapshots()
    }

    // ---- workflows ----

    /// Attach the implementation called for `dependency`.
    pub fn bind(&self, dependency: impl Into<DependencyId>, downstream: Arc<dyn Downstream>) {
        self.coordinator.bind(dependency, downstream);
    }

    pub fn start_workflow(&self, workflow: &str, id: impl Into<InstanceId>) -> Result<State, TransitionError> {
        self.coordinator.start(workflow, id.into())
    }

    pub async fn apply(&self, id: &InstanceId, event: &Event) -> Result<TransitionOutcome, TransitionError> {
        self.coordinator.apply(id, event).await
    }

    pub async fn get_state(&self, id: &InstanceId) -> Result<State, TransitionError> {
        self.coordinator.get_state(id).await
    }

    /// Cancel an in-flight workflow instance through compensation.
    pub async fn cancel_instance(&self, id: &InstanceId) -> Result<TransitionOutcome, TransitionError> {
        self.coordinator.cancel(id).await
    }

    /// Release a finished workflow instance.
    pub async fn forget_instance(&self, id: &InstanceId) -> Result<WorkflowInstance, TransitionError> {
        self.coordinator.forget(id).await
    }

    // ---- control loop ----

    /// Run one control cycle.
    ///
    /// Worker outcomes since the last tick become metric samples, the
    /// analyzer re-ranks the stages, and the rope adjusts the admission rate
    /// from the constraint's buffer occupancy. The rate limits the constraint
    /// and every stage upstream of it; all other queues run at full capacity.
    pub fn tick(&self) -> TickReport {
        let started = self.clock.now();

        let feedback = self.feedback.flush(|stage| {
            self.queues.get(stage).map_or(0, |queue| queue.occupancy())
        });
        self.absorb(feedback);

        let outcome = self.analyzer.analyze(&self.metrics.snapshot_all());
        let stale = outcome.is_stale();
        let constraint = outcome.current().map(|current| current.stage.clone());
        let rate = constraint.as_ref().and_then(|stage| self.pull_rope(stage));

        TickCompleted {
            constraint: constraint.as_ref().map(StageId::as_str),
            rate: rate.map(|decision| decision.rate),
            stale,
            duration: self.clock.now().saturating_duration_since(started),
        }
        .log();

        TickReport {
            constraint,
            rate,
            stale,
        }
    }

    /// Record worker feedback; returns how many samples were accepted.
    fn absorb(&self, samples: Vec<(StageId, StageSample)>) -> usize {
        let mut accepted = 0;
        for (stage, sample) in samples {
            match self.metrics.record(stage.as_str(), sample) {
                Ok(()) => accepted += 1,
                Err(UnknownStage(stage)) => UnknownStageReported { stage: &stage }.log(),
            }
        }
        accepted
    }

    fn pull_rope(&self, constraint: &StageId) -> Option<RateDecision> {
        let spec = self.topology.get(constraint.as_str())?;
        let queue = self.queues.get(constraint)?;

        let decision = {
            let mut rope = self.lock_rope();
            if rope.target.as_ref() != Some(constraint) {
                let start = self.settings.rate.initial_rate.unwrap_or(spec.max_throughput);
                rope.controller.reset(start, spec.max_throughput);
                rope.target = Some(constraint.clone());
            }
            rope.controller
                .tick(constraint.as_str(), spec.max_throughput, queue.occupancy_fraction())
        };

        let mut limited: HashSet<StageId> = self.topology.upstream_of(constraint.as_str()).into_iter().collect();
        limited.insert(constraint.clone());
        for (stage, queue) in &self.queues {
            if limited.contains(stage) {
                queue.set_admission_rate(decision.rate);
            } else {
                queue.clear_admission_rate();
            }
        }
        Some(decision)
    }

    fn lock_rope(&self) -> std::sync::MutexGuard<'_, Rope> {
        self.rope.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Tick on the analyzer's configured interval until `shutdown` fires.
    pub fn spawn_ticker(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.settings.analyzer.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        engine.tick();
                    }
                }
            }
        })
    }

    /// Start one [`StageWorker`] per stage, sized from the stage's `workers`.
    pub fn spawn_workers(&self, shutdown: CancellationToken) -> Vec<JoinHandle<u64>> {
        self.topology
            .stages()
            .iter()
            .filter_map(|spec| {
                let queue = self.queues.get(&spec.id)?;
                let worker = StageWorker::new(
                    Arc::clone(queue),
                    Arc::clone(&self.coordinator),
                    Arc::clone(&self.feedback),
                    Arc::clone(&self.clock),
                    spec.workers,
                );
                Some(worker.spawn(shutdown.clone()))
            })
            .collect()
    }
}

fn unknown_stage(item: WorkItem) -> Rejected {
    let reason = RejectReason::UnknownStage(item.stage.to_string());
    Rejected::new(item, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Priority;
    use crate::config::StageSpec;
    use crate::traits::ManualClock;
    use crate::workflow::InMemoryStore;

    fn stage(id: &str, max_throughput: f64, capacity: usize, downstream: &[&str]) -> StageSpec {
        StageSpec {
            id: StageId::new(id),
            max_throughput,
            latency_target: Duration::from_millis(100),
            queue_capacity: capacity,
            high_priority_reserve: 0,
            workers: 1,
            downstream: downstream.iter().map(|d| StageId::new(*d)).collect(),
            circuit: None,
        }
    }

    fn engine(clock: Arc<ManualClock>) -> FlowEngine {
        let topology = Arc::new(StageTopology::new(vec![
            stage("intake", 100.0, 50, &["payment"]),
            stage("payment", 20.0, 10, &["shipping"]),
            stage("shipping", 100.0, 50, &[]),
        ]));
        let coordinator = Arc::new(WorkflowCoordinator::new(
            Vec::new(),
            Arc::new(InMemoryStore::new()),
            CircuitRegistry::new(Vec::new(), clock.clone()),
        ));
        FlowEngine::new(topology, EngineSettings::default(), coordinator, clock)
    }

    #[test]
    fn test_unknown_stage_is_typed() {
        let engine = engine(Arc::new(ManualClock::new()));
        let rejected = engine
            .admit(WorkItem::new("billing", Priority::High, "x"))
            .unwrap_err();
        assert_eq!(rejected.reason, RejectReason::UnknownStage("billing".into()));
        assert_eq!(engine.queue_status("billing"), Err(UnknownStage("billing".into())));
        assert!(engine.record("billing", StageSample::default()).is_err());
    }

    #[test]
    fn test_tick_without_samples_is_stale() {
        let engine = engine(Arc::new(ManualClock::new()));
        let report = engine.tick();
        assert!(report.stale);
        assert_eq!(report.constraint, None);
        assert_eq!(report.rate, None);
    }

    #[test]
    fn test_feedback_for_foreign_stage_is_skipped() {
        let engine = engine(Arc::new(ManualClock::new()));
        let sample = || StageSample::new(5.0, Duration::from_millis(10), 0.0, 0.5, 0);

        let accepted = engine.absorb(vec![
            (StageId::new("billing"), sample()),
            (StageId::new("payment"), sample()),
        ]);

        assert_eq!(accepted, 1);
        assert_eq!(engine.snapshot("payment").unwrap().sample_count, 1);
        assert!(engine.snapshot("billing").is_err());
    }

    #[test]
    fn test_rope_limits_constraint_and_upstream_only() {
        let clock = Arc::new(ManualClock::new());
        let engine = engine(clock.clone());

        engine
            .record("payment", StageSample::new(19.0, Duration::from_millis(400), 0.05, 0.98, 9))
            .unwrap();
        engine
            .record("intake", StageSample::new(40.0, Duration::from_millis(20), 0.0, 0.3, 0))
            .unwrap();
        engine
            .record("shipping", StageSample::new(19.0, Duration::from_millis(30), 0.0, 0.2, 0))
            .unwrap();

        for n in 0..10 {
            engine
                .admit(WorkItem::new("payment", Priority::Medium, format!("p{}", n).as_str()))
                .unwrap();
        }

        let report = engine.tick();
        assert_eq!(report.constraint.as_ref().map(StageId::as_str), Some("payment"));
        let decision = report.rate.unwrap();
        assert_eq!(decision.previous, 20.0);
        assert_eq!(decision.rate, 16.0);

        assert_eq!(engine.queue_status("payment").unwrap().effective_capacity, 10);
        assert_eq!(engine.queue_status("intake").unwrap().effective_capacity, 16);
        assert_eq!(engine.queue_status("intake").unwrap().admission_rate, Some(16.0));
        assert_eq!(engine.queue_status("shipping").unwrap().effective_capacity, 50);
        assert_eq!(engine.queue_status("shipping").unwrap().admission_rate, None);
    }

    #[test]
    fn test_cancel_finds_item_in_any_queue() {
        let engine = engine(Arc::new(ManualClock::new()));
        let admitted = engine
            .admit(WorkItem::new("shipping", Priority::Low, "parcel"))
            .unwrap();

        let cancelled = engine.cancel(admitted.id).unwrap();
        assert_eq!(cancelled.payload.0, "parcel");
        assert!(engine.cancel(admitted.id).is_none());
        assert_eq!(engine.queue_status("shipping").unwrap().occupancy, 0);
    }
}
