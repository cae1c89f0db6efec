// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::admission::{AdmissionQueue, WorkItem};
use crate::engine::feedback::OutcomeTally;
use crate::errors::ActionFailure;
use crate::observability::messages::engine::{ItemFailed, ItemRequeued, WorkerStarted, WorkerStopped};
use crate::observability::messages::{StructuredLog, StructuredSpan};
use crate::traits::Clock;
use crate::types::{Event, InstanceId};
use crate::workflow::{TransitionOutcome, WorkflowCoordinator};

/// Drains one stage's admission queue with bounded concurrency.
///
/// Items carrying a workflow transition are applied through the coordinator.
/// A failed action is re-admitted until the workflow's retry budget is spent,
/// then the instance is rolled back. Items with no transition attached
/// complete as soon as they are dispatched.
pub struct StageWorker {
    context: Arc<WorkerContext>,
    concurrency: usize,
}

struct WorkerContext {
    queue: Arc<AdmissionQueue>,
    coordinator: Arc<WorkflowCoordinator>,
    feedback: Arc<OutcomeTally>,
    clock: Arc<dyn Clock>,
}

impl StageWorker {
    pub fn new(
        queue: Arc<AdmissionQueue>,
        coordinator: Arc<WorkflowCoordinator>,
        feedback: Arc<OutcomeTally>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                queue,
                coordinator,
                feedback,
                clock,
            }),
            concurrency: concurrency.max(1),
        }
    }

    /// Run until `shutdown` fires; resolves to the number of items dispatched.
    ///
    /// In-flight items finish before the task ends.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) -> u64 {
        let stage = self.context.queue.stage().clone();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut processed = 0;

        let started = WorkerStarted {
            stage: stage.as_str(),
            concurrency: self.concurrency,
        };
        let span = started.span("stage_worker");
        started.log();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let item = tokio::select! {
                _ = shutdown.cancelled() => break,
                item = self.context.queue.next() => item,
            };

            processed += 1;
            let context = Arc::clone(&self.context);
            tokio::spawn(
                async move {
                    context.process(item).await;
                    drop(permit);
                }
                .instrument(span.clone()),
            );
        }

        // Wait for in-flight items.
        let _ = permits.acquire_many(self.concurrency as u32).await;

        span.in_scope(|| {
            WorkerStopped {
                stage: stage.as_str(),
                processed,
            }
            .log()
        });
        processed
    }
}

impl WorkerContext {
    async fn process(&self, item: WorkItem) {
        let started = self.clock.now();
        let stage = item.stage.clone();

        let succeeded = match (item.instance.clone(), item.event.clone()) {
            (Some(instance), Some(event)) => self.advance(item, &instance, &event).await,
            _ => true,
        };

        let latency = self.clock.now().saturating_duration_since(started);
        if succeeded {
            self.feedback.record_success(stage.as_str(), latency);
        } else {
            self.feedback.record_failure(stage.as_str(), latency);
        }
    }

    async fn advance(&self, mut item: WorkItem, instance: &InstanceId, event: &Event) -> bool {
        let failure = match self.coordinator.try_apply(instance, event).await {
            Ok(TransitionOutcome::Applied { .. }) => return true,
            Ok(TransitionOutcome::ActionFailed { failure, .. }) => failure,
            Ok(_) => return false,
            Err(e) => {
                self.fail(&item, &e.to_string());
                return false;
            }
        };

        let budget = self.retry_budget(instance).await;
        if item.retry_count < budget {
            item.retry_count += 1;
            let (id, retry) = (item.id, item.retry_count);
            match self.queue.admit(item) {
                Ok(_) => {
                    ItemRequeued {
                        stage: self.queue.stage().as_str(),
                        item_id: id,
                        retry,
                        max_retries: budget,
                    }
                    .log();
                    return false;
                }
                Err(rejected) => {
                    let (returned, _) = rejected.into_parts();
                    item = returned;
                }
            }
        }

        self.fail(&item, &failure.to_string());
        let exhausted = ActionFailure::RetriesExhausted {
            attempts: item.retry_count + 1,
            last: Box::new(failure),
        };
        if let Err(e) = self.coordinator.abort(instance, exhausted).await {
            self.fail(&item, &e.to_string());
        }
        false
    }

    async fn retry_budget(&self, instance: &InstanceId) -> u32 {
        let workflow = match self.coordinator.snapshot(instance).await {
            Ok(snapshot) => snapshot.workflow,
            Err(_) => return 0,
        };
        self.coordinator
            .definition(&workflow)
            .map(|definition| definition.max_retries())
            .unwrap_or(0)
    }

    fn fail(&self, item: &WorkItem, reason: &str) {
        ItemFailed {
            stage: self.queue.stage().as_str(),
            item_id: item.id,
            reason,
        }
        .log();
    }
}
