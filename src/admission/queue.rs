// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use crate::admission::lanes::{ClassOrdering, PriorityLanes};
use crate::admission::work_item::{Priority, WorkItem};
use crate::circuit::CircuitGuard;
use crate::config::consts::{
    DEFAULT_AGING_THRESHOLD_MS, DEFAULT_BLOCKING_TIMEOUT_MS, DEFAULT_BUFFER_SECONDS,
};
use crate::config::StageSpec;
use crate::errors::{RejectReason, Rejected};
use crate::observability::messages::admission::{
    CapacityAdjusted, ItemAdmitted, ItemCancelled, ItemDispatched, ItemRejected, ItemsPromoted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Clock;
use crate::types::{StageId, WorkItemId};

/// Admission behavior shared by every stage queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionSettings {
    pub aging_threshold: Duration,
    /// Default wait for `admit_blocking` when the caller gives none.
    pub blocking_timeout: Duration,
    /// Seconds of work at the current rate a queue may hold.
    pub buffer_seconds: f64,
    pub ordering: ClassOrdering,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            aging_threshold: Duration::from_millis(DEFAULT_AGING_THRESHOLD_MS),
            blocking_timeout: Duration::from_millis(DEFAULT_BLOCKING_TIMEOUT_MS),
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            ordering: ClassOrdering::Strict,
        }
    }
}

/// Receipt for an accepted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub id: WorkItemId,
    pub stage: StageId,
    /// Occupancy right after the item was queued.
    pub occupancy: usize,
    pub capacity: usize,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub stage: StageId,
    pub occupancy: usize,
    pub effective_capacity: usize,
    pub max_capacity: usize,
    /// Rate the rope last set for this queue; `None` when unthrottled.
    pub admission_rate: Option<f64>,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QueueStatus {
    /// Occupancy over the fixed maximum capacity.
    pub fn occupancy_fraction(&self) -> f64 {
        self.occupancy as f64 / self.max_capacity.max(1) as f64
    }
}

#[derive(Debug)]
struct QueueState {
    lanes: PriorityLanes,
    effective_capacity: usize,
    admission_rate: Option<f64>,
}

/// Bounded, prioritized queue in front of one stage.
///
/// Occupancy never exceeds the fixed maximum capacity `K`. The rope may lower
/// the effective capacity below `K`; that takes effect at the next admission
/// check and never evicts items already queued. Every item leaves exactly once:
/// dispatched, cancelled, or handed back in a [`Rejected`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use the_flowgate::admission::{AdmissionQueue, AdmissionSettings, Priority, WorkItem};
/// use the_flowgate::config::StageSpec;
/// use the_flowgate::traits::SystemClock;
/// use the_flowgate::types::StageId;
///
/// let spec = StageSpec {
///     id: StageId::new("payment"),
///     max_throughput: 100.0,
///     latency_target: Duration::from_millis(200),
///     queue_capacity: 1,
///     high_priority_reserve: 0,
///     workers: 1,
///     downstream: vec![],
///     circuit: None,
/// };
/// let queue = AdmissionQueue::new(&spec, AdmissionSettings::default(), None, Arc::new(SystemClock));
///
/// assert!(queue.admit(WorkItem::new("payment", Priority::High, "a")).is_ok());
/// let rejected = queue.admit(WorkItem::new("payment", Priority::High, "b")).unwrap_err();
/// assert!(rejected.is_queue_full());
/// assert_eq!(rejected.item.payload.0, "b");
/// ```
#[derive(Debug)]
pub struct AdmissionQueue {
    stage: StageId,
    max_capacity: usize,
    high_priority_reserve: usize,
    settings: AdmissionSettings,
    state: Mutex<QueueState>,
    space: Notify,
    ready: Notify,
    circuit: Option<Arc<CircuitGuard>>,
    clock: Arc<dyn Clock>,
}

impl AdmissionQueue {
    pub fn new(
        spec: &StageSpec,
        settings: AdmissionSettings,
        circuit: Option<Arc<CircuitGuard>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max_capacity = spec.queue_capacity.max(1);
        Self {
            stage: spec.id.clone(),
            max_capacity,
            high_priority_reserve: spec.high_priority_reserve.min(max_capacity - 1),
            settings,
            state: Mutex::new(QueueState {
                lanes: PriorityLanes::new(settings.ordering, settings.aging_threshold),
                effective_capacity: max_capacity,
                admission_rate: None,
            }),
            space: Notify::new(),
            ready: Notify::new(),
            circuit,
            clock,
        }
    }

    pub fn stage(&self) -> &StageId {
        &self.stage
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Non-blocking admission.
    pub fn admit(&self, item: WorkItem) -> Result<Admitted, Rejected> {
        if let Some(reason) = self.check_circuit() {
            return Err(self.reject(reason, item));
        }

        let mut state = self.lock();
        let occupancy = state.lanes.len();
        let capacity = state.effective_capacity;
        let limit = match item.priority {
            Priority::High => capacity,
            _ => capacity.saturating_sub(self.high_priority_reserve),
        };

        if occupancy >= limit {
            drop(state);
            let reason = RejectReason::QueueFull {
                stage: self.stage.clone(),
                occupancy,
                capacity,
            };
            return Err(self.reject(reason, item));
        }

        let id = item.id;
        let priority = item.priority;
        state.lanes.push(item, self.clock.now());
        let occupancy = state.lanes.len();
        drop(state);
        self.ready.notify_one();

        ItemAdmitted {
            stage: self.stage.as_str(),
            item_id: id,
            priority: priority.as_str(),
            occupancy,
            capacity,
        }
        .log();

        Ok(Admitted {
            id,
            stage: self.stage.clone(),
            occupancy,
            capacity,
        })
    }

    /// Admission that waits for space, up to `timeout` (or the configured
    /// blocking timeout). A circuit rejection is returned immediately.
    pub async fn admit_blocking(
        &self,
        item: WorkItem,
        timeout: Option<Duration>,
    ) -> Result<Admitted, Rejected> {
        let timeout = timeout.unwrap_or(self.settings.blocking_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut item = item;

        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.admit(item) {
                Ok(admitted) => return Ok(admitted),
                Err(rejected) if rejected.is_queue_full() => {
                    let (returned, reason) = rejected.into_parts();
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Rejected::new(returned, reason));
                    }
                    item = returned;
                }
                Err(rejected) => return Err(rejected),
            }
        }
    }

    /// Hand the next item to a worker.
    pub fn dispatch(&self) -> Option<WorkItem> {
        let now = self.clock.now();
        let mut state = self.lock();

        let promoted = state.lanes.promote_aged(now);
        let queued = state.lanes.pop_next();
        drop(state);

        if promoted > 0 {
            ItemsPromoted {
                stage: self.stage.as_str(),
                promoted,
            }
            .log();
        }

        let queued = queued?;
        self.space.notify_waiters();

        ItemDispatched {
            stage: self.stage.as_str(),
            item_id: queued.item.id,
            priority: queued.effective.as_str(),
            waited: now.saturating_duration_since(queued.enqueued_at),
        }
        .log();
        Some(queued.item)
    }

    /// Wait until an item can be dispatched.
    pub async fn next(&self) -> WorkItem {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.dispatch() {
                return item;
            }
            notified.await;
        }
    }

    /// Remove a queued item without dispatching it.
    pub fn cancel(&self, id: WorkItemId) -> Option<WorkItem> {
        let removed = self.lock().lanes.remove(id)?;
        self.space.notify_waiters();
        ItemCancelled {
            stage: self.stage.as_str(),
            item_id: id,
        }
        .log();
        Some(removed.item)
    }

    /// Set the effective capacity, clamped to `[1, K]`.
    pub fn set_capacity(&self, capacity: usize) -> usize {
        let capacity = capacity.clamp(1, self.max_capacity);
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.effective_capacity, capacity)
        };

        if previous != capacity {
            CapacityAdjusted {
                stage: self.stage.as_str(),
                previous,
                current: capacity,
                max_capacity: self.max_capacity,
            }
            .log();
            if capacity > previous {
                self.space.notify_waiters();
            }
        }
        capacity
    }

    /// Apply a rope rate: capacity becomes `ceil(rate * buffer_seconds)`.
    pub fn set_admission_rate(&self, rate: f64) -> usize {
        let raw = (rate * self.settings.buffer_seconds).ceil();
        let capacity = if raw.is_finite() && raw > 0.0 {
            raw.min(self.max_capacity as f64) as usize
        } else {
            1
        };
        self.lock().admission_rate = Some(rate);
        self.set_capacity(capacity)
    }

    /// Lift any rope limit, back to full capacity.
    pub fn clear_admission_rate(&self) {
        self.lock().admission_rate = None;
        self.set_capacity(self.max_capacity);
    }

    pub fn occupancy(&self) -> usize {
        self.lock().lanes.len()
    }

    /// Occupancy over the fixed maximum capacity.
    pub fn occupancy_fraction(&self) -> f64 {
        self.occupancy() as f64 / self.max_capacity as f64
    }

    pub fn effective_capacity(&self) -> usize {
        self.lock().effective_capacity
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        let [high, medium, low] = state.lanes.class_lengths();
        QueueStatus {
            stage: self.stage.clone(),
            occupancy: state.lanes.len(),
            effective_capacity: state.effective_capacity,
            max_capacity: self.max_capacity,
            admission_rate: state.admission_rate,
            high,
            medium,
            low,
        }
    }

    fn check_circuit(&self) -> Option<RejectReason> {
        let circuit = self.circuit.as_ref()?;
        if circuit.admits() {
            return None;
        }
        Some(RejectReason::CircuitOpenForStage {
            stage: self.stage.clone(),
            dependency: circuit.dependency().clone(),
        })
    }

    fn reject(&self, reason: RejectReason, item: WorkItem) -> Rejected {
        ItemRejected {
            stage: self.stage.as_str(),
            item_id: item.id,
            reason: &reason,
        }
        .log();
        Rejected::new(item, reason)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{CircuitSettings, CircuitState};
    use crate::traits::ManualClock;
    use crate::types::DependencyId;

    fn spec(capacity: usize, reserve: usize) -> StageSpec {
        StageSpec {
            id: StageId::new("payment"),
            max_throughput: 100.0,
            latency_target: Duration::from_millis(100),
            queue_capacity: capacity,
            high_priority_reserve: reserve,
            workers: 1,
            downstream: vec![],
            circuit: None,
        }
    }

    fn queue(capacity: usize, reserve: usize, clock: Arc<ManualClock>) -> AdmissionQueue {
        AdmissionQueue::new(&spec(capacity, reserve), AdmissionSettings::default(), None, clock)
    }

    fn item(priority: Priority) -> WorkItem {
        WorkItem::new("payment", priority, "order")
    }

    #[test]
    fn test_sixth_admission_rejected_when_full() {
        let q = queue(5, 0, Arc::new(ManualClock::new()));
        for _ in 0..5 {
            assert!(q.admit(item(Priority::High)).is_ok());
        }

        let rejected = q.admit(item(Priority::High)).unwrap_err();
        assert_eq!(
            rejected.reason,
            RejectReason::QueueFull {
                stage: StageId::new("payment"),
                occupancy: 5,
                capacity: 5,
            }
        );
        assert_eq!(q.occupancy(), 5);
    }

    #[test]
    fn test_reserve_only_admits_high() {
        let q = queue(3, 1, Arc::new(ManualClock::new()));
        assert!(q.admit(item(Priority::Low)).is_ok());
        assert!(q.admit(item(Priority::Medium)).is_ok());
        assert!(q.admit(item(Priority::Low)).unwrap_err().is_queue_full());
        assert!(q.admit(item(Priority::High)).is_ok());
        assert_eq!(q.occupancy(), 3);
    }

    #[test]
    fn test_lower_capacity_never_evicts() {
        let q = queue(5, 0, Arc::new(ManualClock::new()));
        for _ in 0..4 {
            q.admit(item(Priority::Low)).unwrap();
        }

        assert_eq!(q.set_capacity(2), 2);
        assert_eq!(q.occupancy(), 4);
        assert!(q.admit(item(Priority::High)).is_err());

        for _ in 0..3 {
            q.dispatch().unwrap();
        }
        assert!(q.admit(item(Priority::High)).is_ok());
    }

    #[test]
    fn test_rate_maps_to_capacity() {
        let q = queue(10, 0, Arc::new(ManualClock::new()));
        assert_eq!(q.set_admission_rate(3.2), 4);
        assert_eq!(q.set_admission_rate(500.0), 10);
        assert_eq!(q.set_admission_rate(0.0), 1);
        assert_eq!(q.status().admission_rate, Some(0.0));

        q.clear_admission_rate();
        assert_eq!(q.effective_capacity(), 10);
        assert_eq!(q.status().admission_rate, None);
    }

    #[test]
    fn test_aged_low_dispatched_before_later_low() {
        let clock = Arc::new(ManualClock::new());
        let q = queue(10, 0, clock.clone());

        let first = item(Priority::Low);
        let first_id = first.id;
        q.admit(first).unwrap();
        clock.advance(Duration::from_secs(6));
        q.admit(item(Priority::Low)).unwrap();
        q.admit(item(Priority::Medium)).unwrap();

        assert_eq!(q.dispatch().unwrap().id, first_id);
    }

    #[test]
    fn test_cancel_removes_without_dispatch() {
        let q = queue(5, 0, Arc::new(ManualClock::new()));
        let target = item(Priority::Medium);
        let id = target.id;
        q.admit(target).unwrap();

        assert_eq!(q.cancel(id).unwrap().id, id);
        assert!(q.cancel(id).is_none());
        assert!(q.dispatch().is_none());
    }

    #[test]
    fn test_open_circuit_rejects_admission() {
        let clock = Arc::new(ManualClock::new());
        let guard = Arc::new(CircuitGuard::new(
            DependencyId::new("payment-gateway"),
            CircuitSettings {
                window_size: 2,
                minimum_calls: 2,
                ..CircuitSettings::default()
            },
            clock.clone(),
        ));
        guard.record_failure();
        guard.record_failure();
        assert_eq!(guard.state(), CircuitState::Open);

        let q = AdmissionQueue::new(&spec(5, 0), AdmissionSettings::default(), Some(guard), clock);
        let rejected = q.admit(item(Priority::High)).unwrap_err();
        assert!(matches!(rejected.reason, RejectReason::CircuitOpenForStage { .. }));
        assert_eq!(q.occupancy(), 0);
    }

    #[tokio::test]
    async fn test_blocking_admission_waits_for_dispatch() {
        let q = Arc::new(queue(1, 0, Arc::new(ManualClock::new())));
        q.admit(item(Priority::High)).unwrap();

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move {
                q.admit_blocking(item(Priority::Low), Some(Duration::from_secs(5)))
                    .await
            })
        };

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(q.dispatch().is_some());

        let admitted = waiter.await.unwrap();
        assert!(admitted.is_ok());
        assert_eq!(q.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_blocking_admission_times_out() {
        let q = queue(1, 0, Arc::new(ManualClock::new()));
        q.admit(item(Priority::High)).unwrap();

        let rejected = q
            .admit_blocking(item(Priority::High), Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(rejected.is_queue_full());
        assert_eq!(q.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_admission() {
        let q = Arc::new(queue(4, 0, Arc::new(ManualClock::new())));

        let worker = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let admitted = q.admit(item(Priority::Medium)).unwrap();

        let dispatched = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dispatched.id, admitted.id);
        assert_eq!(q.occupancy(), 0);
    }
}
