// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::Instrument;

use crate::circuit::CircuitRegistry;
use crate::errors::{ActionFailure, GuardedCallError, TransitionError};
use crate::observability::messages::workflow::{
    ActionFailed, CompensationCompleted, CompensationStalled, CompensationStarted, InstanceForgotten,
    InstanceRecovered, InstanceStarted, TransitionApplied, TransitionRejected,
};
use crate::observability::messages::{StructuredLog, StructuredSpan};
use crate::traits::{Downstream, DownstreamCall, InstanceStore};
use crate::types::{DependencyId, Event, InstanceId, State};
use crate::workflow::{TransitionKind, TransitionRule, WorkflowDefinition, WorkflowInstance};

/// What happened to an event handed to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition and its side effect completed.
    Applied { state: State },
    /// The side effect failed and the instance was left unchanged.
    /// Only returned by [`WorkflowCoordinator::try_apply`].
    ActionFailed { state: State, failure: ActionFailure },
    /// The instance rolled back to a terminal state.
    Compensated { state: State, reason: String },
    /// Rollback started but a compensation step could not run yet.
    /// [`WorkflowCoordinator::resume`] continues it.
    CompensationPending { state: State, reason: String },
}

impl TransitionOutcome {
    pub fn state(&self) -> &State {
        match self {
            TransitionOutcome::Applied { state }
            | TransitionOutcome::ActionFailed { state, .. }
            | TransitionOutcome::Compensated { state, .. }
            | TransitionOutcome::CompensationPending { state, .. } => state,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

type InstanceHandle = Arc<AsyncMutex<WorkflowInstance>>;

/// Drives workflow instances through their transition tables.
///
/// Events for one instance are serialized by a per-instance async mutex held
/// across the side-effect call; different instances never contend. Every
/// change is applied to a copy, saved to the [`InstanceStore`], and only then
/// committed in memory, so a rejected or failed event never leaves a partial
/// mutation behind.
pub struct WorkflowCoordinator {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
    instances: RwLock<HashMap<InstanceId, InstanceHandle>>,
    store: Arc<dyn InstanceStore>,
    circuits: CircuitRegistry,
    downstreams: RwLock<HashMap<DependencyId, Arc<dyn Downstream>>>,
}

impl WorkflowCoordinator {
    pub fn new(
        definitions: Vec<WorkflowDefinition>,
        store: Arc<dyn InstanceStore>,
        circuits: CircuitRegistry,
    ) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.name().to_string(), Arc::new(d)))
                .collect(),
            instances: RwLock::new(HashMap::new()),
            store,
            circuits,
            downstreams: RwLock::new(HashMap::new()),
        }
    }

    /// Attach the implementation called for `dependency`.
    pub fn bind(&self, dependency: impl Into<DependencyId>, downstream: Arc<dyn Downstream>) {
        let mut downstreams = self.downstreams.write().unwrap_or_else(|p| p.into_inner());
        downstreams.insert(dependency.into(), downstream);
    }

    pub fn definition(&self, workflow: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(workflow).cloned()
    }

    pub fn workflow_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let instances = self.instances.read().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<InstanceId> = instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Create an instance of `workflow` in its initial state.
    pub fn start(&self, workflow: &str, id: InstanceId) -> Result<State, TransitionError> {
        let definition = self
            .definition(workflow)
            .ok_or_else(|| TransitionError::UnknownWorkflow(workflow.to_string()))?;

        let mut instances = self.instances.write().unwrap_or_else(|p| p.into_inner());
        if instances.contains_key(&id) || self.store.load(&id)?.is_some() {
            return Err(TransitionError::DuplicateInstance(id));
        }

        let instance = WorkflowInstance::new(id.clone(), &definition);
        self.store.save(&instance)?;
        InstanceStarted {
            instance: id.as_str(),
            workflow,
            state: instance.state.as_str(),
        }
        .log();

        let state = instance.state.clone();
        instances.insert(id, Arc::new(AsyncMutex::new(instance)));
        Ok(state)
    }

    /// Apply `event`; if its side effect fails, roll the instance back.
    pub async fn apply(&self, id: &InstanceId, event: &Event) -> Result<TransitionOutcome, TransitionError> {
        self.apply_event(id, event, true).await
    }

    /// Apply `event`; if its side effect fails, leave the instance as it was
    /// and report the failure so the caller can retry.
    pub async fn try_apply(&self, id: &InstanceId, event: &Event) -> Result<TransitionOutcome, TransitionError> {
        self.apply_event(id, event, false).await
    }

    /// Roll an instance back because of `failure` raised outside the coordinator.
    pub async fn abort(&self, id: &InstanceId, failure: ActionFailure) -> Result<TransitionOutcome, TransitionError> {
        let handle = self.handle(id)?;
        let mut instance = handle.lock().await;
        let definition = self.definition_for(&instance)?;

        if definition.is_terminal(instance.state.as_str()) {
            return Err(TransitionError::InvalidTransition {
                instance: id.clone(),
                state: instance.state.clone(),
                event: definition
                    .abort_event()
                    .cloned()
                    .unwrap_or_else(|| Event::new("abort")),
            });
        }
        self.rollback(&mut instance, &definition, failure.to_string()).await
    }

    /// Cancel an in-flight instance through the compensation path.
    pub async fn cancel(&self, id: &InstanceId) -> Result<TransitionOutcome, TransitionError> {
        self.abort(id, ActionFailure::Cancelled).await
    }

    /// Continue a rollback that stalled or was interrupted.
    pub async fn resume(&self, id: &InstanceId) -> Result<TransitionOutcome, TransitionError> {
        let handle = self.handle(id)?;
        let mut instance = handle.lock().await;
        if !instance.compensating {
            return Ok(TransitionOutcome::Applied {
                state: instance.state.clone(),
            });
        }
        let definition = self.definition_for(&instance)?;
        let reason = instance.failure.clone().unwrap_or_default();
        self.continue_rollback(&mut instance, &definition, reason).await
    }

    pub async fn get_state(&self, id: &InstanceId) -> Result<State, TransitionError> {
        let handle = self.handle(id)?;
        let instance = handle.lock().await;
        Ok(instance.state.clone())
    }

    pub async fn snapshot(&self, id: &InstanceId) -> Result<WorkflowInstance, TransitionError> {
        let handle = self.handle(id)?;
        let instance = handle.lock().await;
        Ok(instance.clone())
    }

    /// Release a finished instance from memory and from the store, returning
    /// its final record.
    ///
    /// Refused with [`TransitionError::NotFinished`] unless the instance is in
    /// a terminal state with no rollback under way.
    pub async fn forget(&self, id: &InstanceId) -> Result<WorkflowInstance, TransitionError> {
        let handle = self.handle(id)?;
        let instance = handle.lock().await;
        let definition = self.definition_for(&instance)?;
        if instance.compensating || !definition.is_terminal(instance.state.as_str()) {
            return Err(TransitionError::NotFinished {
                instance: id.clone(),
                state: instance.state.clone(),
            });
        }

        self.store.remove(id)?;
        self.instances
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);

        InstanceForgotten {
            instance: id.as_str(),
            state: instance.state.as_str(),
        }
        .log();
        Ok(instance.clone())
    }

    /// Load every stored instance not already in memory and resume any
    /// rollback that was under way. Returns the number of instances restored.
    pub async fn recover(&self) -> Result<usize, TransitionError> {
        let mut resumable = Vec::new();
        let mut restored = 0;
        {
            let stored = self.store.load_all()?;
            let mut instances = self.instances.write().unwrap_or_else(|p| p.into_inner());
            for instance in stored {
                if !self.definitions.contains_key(&instance.workflow) {
                    return Err(TransitionError::UnknownWorkflow(instance.workflow));
                }
                if instances.contains_key(&instance.id) {
                    continue;
                }
                InstanceRecovered {
                    instance: instance.id.as_str(),
                    state: instance.state.as_str(),
                    compensating: instance.compensating,
                }
                .log();
                if instance.compensating {
                    resumable.push(instance.id.clone());
                }
                instances.insert(instance.id.clone(), Arc::new(AsyncMutex::new(instance)));
                restored += 1;
            }
        }

        for id in resumable {
            self.resume(&id).await?;
        }
        Ok(restored)
    }

    async fn apply_event(
        &self,
        id: &InstanceId,
        event: &Event,
        compensate_on_failure: bool,
    ) -> Result<TransitionOutcome, TransitionError> {
        let handle = self.handle(id)?;
        let mut instance = handle.lock().await;
        let definition = self.definition_for(&instance)?;

        if instance.compensating {
            return Err(TransitionError::CompensationInProgress(id.clone()));
        }

        let rule = if definition.is_terminal(instance.state.as_str()) {
            None
        } else {
            definition.rule(instance.state.as_str(), event.as_str())
        };
        let Some(rule) = rule else {
            TransitionRejected {
                instance: id.as_str(),
                state: instance.state.as_str(),
                event: event.as_str(),
            }
            .log();
            return Err(TransitionError::InvalidTransition {
                instance: id.clone(),
                state: instance.state.clone(),
                event: event.clone(),
            });
        };

        let kind = if definition.abort_event() == Some(event) {
            TransitionKind::Abort
        } else {
            TransitionKind::Forward
        };

        match self.run_action(&instance, rule, event, false).await {
            Ok(()) => {
                self.record_transition(&mut instance, event, rule, kind)?;
                Ok(TransitionOutcome::Applied {
                    state: instance.state.clone(),
                })
            }
            Err(failure) => {
                ActionFailed {
                    instance: id.as_str(),
                    state: instance.state.as_str(),
                    event: event.as_str(),
                    failure: &failure,
                }
                .log();
                if compensate_on_failure {
                    self.rollback(&mut instance, &definition, failure.to_string()).await
                } else {
                    Ok(TransitionOutcome::ActionFailed {
                        state: instance.state.clone(),
                        failure,
                    })
                }
            }
        }
    }

    async fn rollback(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        reason: String,
    ) -> Result<TransitionOutcome, TransitionError> {
        if instance.compensating {
            return self.continue_rollback(instance, definition, reason).await;
        }

        let failure = reason.clone();
        self.commit(instance, |next| {
            next.compensating = true;
            next.failure = Some(failure);
        })?;
        let started = CompensationStarted {
            instance: instance.id.as_str(),
            state: instance.state.as_str(),
            pending_steps: instance.uncompensated().len(),
        };
        let span = started.span("rollback");
        started.log();
        self.continue_rollback(instance, definition, reason)
            .instrument(span)
            .await
    }

    async fn continue_rollback(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        reason: String,
    ) -> Result<TransitionOutcome, TransitionError> {
        // Each step is chosen from the persisted state, so a resumed rollback
        // never repeats a step that already committed.
        while let Some(step) = instance.next_rollback_step(definition) {
            let Some(rule) = definition.rule(instance.state.as_str(), step.event().as_str()) else {
                break;
            };
            if let Err(failure) = self.run_action(instance, rule, step.event(), true).await {
                CompensationStalled {
                    instance: instance.id.as_str(),
                    state: instance.state.as_str(),
                    failure: &failure,
                }
                .log();
                return Ok(TransitionOutcome::CompensationPending {
                    state: instance.state.clone(),
                    reason,
                });
            }
            self.record_transition(instance, step.event(), rule, step.kind())?;
        }

        if !definition.is_terminal(instance.state.as_str()) {
            return Ok(TransitionOutcome::CompensationPending {
                state: instance.state.clone(),
                reason,
            });
        }

        self.commit(instance, |next| next.compensating = false)?;
        CompensationCompleted {
            instance: instance.id.as_str(),
            final_state: instance.state.as_str(),
        }
        .log();
        Ok(TransitionOutcome::Compensated {
            state: instance.state.clone(),
            reason,
        })
    }

    fn record_transition(
        &self,
        instance: &mut WorkflowInstance,
        event: &Event,
        rule: &TransitionRule,
        kind: TransitionKind,
    ) -> Result<(), TransitionError> {
        let from = instance.state.clone();
        self.commit(instance, |next| next.record(event.clone(), rule.to.clone(), kind))?;
        TransitionApplied {
            instance: instance.id.as_str(),
            from: from.as_str(),
            event: event.as_str(),
            to: instance.state.as_str(),
        }
        .log();
        Ok(())
    }

    /// Persist a modified copy, then swap it in.
    fn commit<F>(&self, instance: &mut WorkflowInstance, change: F) -> Result<(), TransitionError>
    where
        F: FnOnce(&mut WorkflowInstance),
    {
        let mut next = instance.clone();
        change(&mut next);
        self.store.save(&next)?;
        *instance = next;
        Ok(())
    }

    async fn run_action(
        &self,
        instance: &WorkflowInstance,
        rule: &TransitionRule,
        event: &Event,
        compensation: bool,
    ) -> Result<(), ActionFailure> {
        let Some(dependency) = &rule.dependency else {
            return Ok(());
        };

        let downstream = {
            let downstreams = self.downstreams.read().unwrap_or_else(|p| p.into_inner());
            downstreams.get(dependency).cloned()
        }
        .ok_or_else(|| ActionFailure::Unbound(dependency.clone()))?;
        let guard = self
            .circuits
            .get(dependency.as_str())
            .map_err(|_| ActionFailure::Unbound(dependency.clone()))?;

        let call = DownstreamCall {
            dependency: dependency.clone(),
            instance: instance.id.clone(),
            from: instance.state.clone(),
            event: event.clone(),
            compensation,
        };

        guard
            .call(guard.settings().call_timeout, downstream.invoke(&call))
            .await
            .map_err(|e| match e {
                GuardedCallError::CircuitOpen(_) => ActionFailure::CircuitOpen(dependency.clone()),
                GuardedCallError::Timeout(timeout) => ActionFailure::Timeout {
                    dependency: dependency.clone(),
                    timeout,
                },
                GuardedCallError::Failed(message) => ActionFailure::Failed {
                    dependency: dependency.clone(),
                    message,
                },
            })
    }

    fn handle(&self, id: &InstanceId) -> Result<InstanceHandle, TransitionError> {
        let instances = self.instances.read().unwrap_or_else(|p| p.into_inner());
        instances
            .get(id)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownInstance(id.clone()))
    }

    fn definition_for(&self, instance: &WorkflowInstance) -> Result<Arc<WorkflowDefinition>, TransitionError> {
        self.definition(&instance.workflow)
            .ok_or_else(|| TransitionError::UnknownWorkflow(instance.workflow.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::traits::SystemClock;
    use crate::workflow::InMemoryStore;

    fn order_flow() -> WorkflowDefinition {
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
        )
        .unwrap();
        WorkflowDefinition::from_config(&config).unwrap()
    }

    fn coordinator() -> WorkflowCoordinator {
        WorkflowCoordinator::new(
            vec![order_flow()],
            Arc::new(InMemoryStore::new()),
            CircuitRegistry::new(Vec::new(), Arc::new(SystemClock)),
        )
    }

    #[tokio::test]
    async fn test_invalid_event_leaves_state_unchanged() {
        let coordinator = coordinator();
        let id = InstanceId::new("order-1");
        coordinator.start("order", id.clone()).unwrap();

        let outcome = coordinator.apply(&id, &Event::new("CONFIRM")).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied { state: State::new("PENDING") });

        let err = coordinator.apply(&id, &Event::new("PAY_FAIL")).await.unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { ref state, .. } if state.as_str() == "PENDING"));

        let snapshot = coordinator.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.state.as_str(), "PENDING");
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_state_accepts_nothing() {
        let coordinator = coordinator();
        let id = InstanceId::new("order-2");
        coordinator.start("order", id.clone()).unwrap();
        coordinator.apply(&id, &Event::new("CONFIRM")).await.unwrap();
        coordinator.apply(&id, &Event::new("PAY_OK")).await.unwrap();

        assert!(coordinator.apply(&id, &Event::new("CANCEL")).await.is_err());
        assert!(matches!(
            coordinator.cancel(&id).await,
            Err(TransitionError::InvalidTransition { .. })
        ));
        assert_eq!(coordinator.get_state(&id).await.unwrap().as_str(), "PAID");
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_workflow_and_duplicates() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.start("refund", InstanceId::new("r-1")),
            Err(TransitionError::UnknownWorkflow(_))
        ));

        coordinator.start("order", InstanceId::new("order-3")).unwrap();
        assert!(matches!(
            coordinator.start("order", InstanceId::new("order-3")),
            Err(TransitionError::DuplicateInstance(_))
        ));
        assert!(matches!(
            coordinator.get_state(&InstanceId::new("missing")).await,
            Err(TransitionError::UnknownInstance(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_unwinds_to_terminal() {
        let coordinator = coordinator();
        let id = InstanceId::new("order-4");
        coordinator.start("order", id.clone()).unwrap();
        coordinator.apply(&id, &Event::new("CONFIRM")).await.unwrap();

        let outcome = coordinator.cancel(&id).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Compensated { ref state, .. } if state.as_str() == "CANCELLED"));

        let snapshot = coordinator.snapshot(&id).await.unwrap();
        let kinds: Vec<TransitionKind> = snapshot.history.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![TransitionKind::Forward, TransitionKind::Compensation, TransitionKind::Abort]
        );
        assert!(!snapshot.compensating);
    }

    #[tokio::test]
    async fn test_forget_releases_finished_instances() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = WorkflowCoordinator::new(
            vec![order_flow()],
            store.clone(),
            CircuitRegistry::new(Vec::new(), Arc::new(SystemClock)),
        );

        let ids: Vec<InstanceId> = (0..50).map(|n| InstanceId::new(format!("order-{}", n))).collect();
        for id in &ids {
            coordinator.start("order", id.clone()).unwrap();
            coordinator.apply(id, &Event::new("CONFIRM")).await.unwrap();
            coordinator.apply(id, &Event::new("PAY_OK")).await.unwrap();
        }
        assert_eq!(store.load_all().unwrap().len(), 50);

        for id in &ids {
            let last = coordinator.forget(id).await.unwrap();
            assert_eq!(last.state.as_str(), "PAID");
        }
        assert!(coordinator.instance_ids().is_empty());
        assert!(store.load_all().unwrap().is_empty());

        // The business key is free again.
        coordinator.start("order", ids[0].clone()).unwrap();
    }

    #[tokio::test]
    async fn test_forget_refuses_unfinished_instances() {
        let coordinator = coordinator();
        let id = InstanceId::new("order-5");
        coordinator.start("order", id.clone()).unwrap();
        coordinator.apply(&id, &Event::new("CONFIRM")).await.unwrap();

        assert!(matches!(
            coordinator.forget(&id).await,
            Err(TransitionError::NotFinished { ref state, .. }) if state.as_str() == "PENDING"
        ));
        assert_eq!(coordinator.instance_ids(), vec![id.clone()]);
        assert!(matches!(
            coordinator.forget(&InstanceId::new("missing")).await,
            Err(TransitionError::UnknownInstance(_))
        ));
    }
}
