// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority lanes with aging for a single admission queue.
//!
//! Items wait in one FIFO lane per priority class. Every item carries the
//! sequence number it was admitted with, and each lane is kept sorted by that
//! number, so "oldest first" within a lane is simply "front first".
//!
//! # Aging
//!
//! An item that has waited in its current class for the aging threshold moves
//! up one class and is slotted into the new lane by admission order. Promotion
//! time is computed from when the item entered its class, not from when the
//! lanes were last inspected, so an item that waited two thresholds has moved
//! up two classes no matter how often the queue was polled.
//!
//! # Ordering across classes
//!
//! * **Strict**: the highest non-empty lane always wins.
//! * **Weighted**: non-empty lanes share dispatches by weight using smooth
//!   weighted round-robin. The chosen lane's slot goes to the oldest queued
//!   item of the same original class, so a long-waiting item is never
//!   overtaken by a younger item it was admitted alongside.
//!
//! # Example
//! ```rust
//! use std::time::{Duration, Instant};
//! use the_flowgate::admission::{ClassOrdering, Priority, PriorityLanes, WorkItem};
//!
//! let mut lanes = PriorityLanes::new(ClassOrdering::Strict, Duration::from_secs(5));
//! let now = Instant::now();
//!
//! lanes.push(WorkItem::new("payment", Priority::Low, "a"), now);
//! lanes.push(WorkItem::new("payment", Priority::High, "b"), now);
//!
//! assert_eq!(lanes.pop_next().unwrap().item.payload.0, "b");
//! assert_eq!(lanes.pop_next().unwrap().item.payload.0, "a");
//! assert!(lanes.is_empty());
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::admission::work_item::{Priority, WorkItem};
use crate::config::consts::DEFAULT_CLASS_WEIGHTS;
use crate::types::WorkItemId;

/// How dispatch chooses between priority classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrdering {
    Strict,
    /// Dispatch shares for HIGH, MEDIUM and LOW; each at least 1.
    Weighted { weights: [u32; 3] },
}

impl ClassOrdering {
    pub fn weighted_default() -> Self {
        ClassOrdering::Weighted {
            weights: DEFAULT_CLASS_WEIGHTS,
        }
    }
}

impl Default for ClassOrdering {
    fn default() -> Self {
        ClassOrdering::Strict
    }
}

/// A work item together with its scheduling bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub item: WorkItem,
    /// Class the lanes currently file the item under.
    pub effective: Priority,
    pub class_entered_at: Instant,
    pub enqueued_at: Instant,
    seq: u64,
}

impl QueuedItem {
    /// Class the item was admitted with.
    pub fn original(&self) -> Priority {
        self.item.priority
    }
}

#[derive(Debug)]
pub struct PriorityLanes {
    lanes: [VecDeque<QueuedItem>; 3],
    ordering: ClassOrdering,
    aging_threshold: Duration,
    next_seq: u64,
    credits: [i64; 3],
}

impl PriorityLanes {
    pub fn new(ordering: ClassOrdering, aging_threshold: Duration) -> Self {
        Self {
            lanes: Default::default(),
            ordering,
            aging_threshold,
            next_seq: 0,
            credits: [0; 3],
        }
    }

    pub fn ordering(&self) -> ClassOrdering {
        self.ordering
    }

    /// Queue an item at the back of its class.
    pub fn push(&mut self, mut item: WorkItem, now: Instant) {
        item.enqueued_at = Some(now);
        let queued = QueuedItem {
            effective: item.priority,
            class_entered_at: now,
            enqueued_at: now,
            seq: self.next_seq,
            item,
        };
        self.next_seq += 1;
        self.lanes[queued.effective.rank()].push_back(queued);
    }

    /// Promote every item that has waited out the threshold in its class.
    ///
    /// Returns how many promotions happened.
    pub fn promote_aged(&mut self, now: Instant) -> usize {
        if self.aging_threshold.is_zero() {
            return 0;
        }

        let threshold = self.aging_threshold;
        let mut promoted = 0;
        // Lowest class first so an item can climb more than one level per call.
        for from in [Priority::Low, Priority::Medium] {
            let lane = std::mem::take(&mut self.lanes[from.rank()]);
            let (aged, waiting): (VecDeque<_>, VecDeque<_>) = lane.into_iter().partition(|q| {
                now.saturating_duration_since(q.class_entered_at) >= threshold
            });
            self.lanes[from.rank()] = waiting;

            for mut queued in aged {
                queued.effective = from.promoted();
                queued.class_entered_at += threshold;
                self.insert_in_order(queued);
                promoted += 1;
            }
        }
        promoted
    }

    /// Take the next item to dispatch, or `None` when empty.
    pub fn pop_next(&mut self) -> Option<QueuedItem> {
        let lane = match self.ordering {
            ClassOrdering::Strict => self.lanes.iter().position(|l| !l.is_empty())?,
            ClassOrdering::Weighted { weights } => self.next_weighted_lane(weights)?,
        };

        let head_class = self.lanes[lane].front()?.original();
        let (lane, index) = self.oldest_of_class(head_class).unwrap_or((lane, 0));
        self.lanes[lane].remove(index)
    }

    /// Remove a specific item, wherever it waits.
    pub fn remove(&mut self, id: WorkItemId) -> Option<QueuedItem> {
        for lane in self.lanes.iter_mut() {
            if let Some(index) = lane.iter().position(|q| q.item.id == id) {
                return lane.remove(index);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Items per effective class, HIGH first.
    pub fn class_lengths(&self) -> [usize; 3] {
        [self.lanes[0].len(), self.lanes[1].len(), self.lanes[2].len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedItem> {
        self.lanes.iter().flat_map(|lane| lane.iter())
    }

    fn insert_in_order(&mut self, queued: QueuedItem) {
        let lane = &mut self.lanes[queued.effective.rank()];
        let at = lane.partition_point(|q| q.seq < queued.seq);
        lane.insert(at, queued);
    }

    fn oldest_of_class(&self, class: Priority) -> Option<(usize, usize)> {
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(lane, items)| {
                items
                    .iter()
                    .position(|q| q.original() == class)
                    .map(|index| (lane, index, items[index].seq))
            })
            .min_by_key(|&(_, _, seq)| seq)
            .map(|(lane, index, _)| (lane, index))
    }

    fn next_weighted_lane(&mut self, weights: [u32; 3]) -> Option<usize> {
        let mut total = 0i64;
        let mut best: Option<usize> = None;

        for lane in 0..3 {
            if self.lanes[lane].is_empty() {
                self.credits[lane] = 0;
                continue;
            }
            let weight = i64::from(weights[lane].max(1));
            self.credits[lane] += weight;
            total += weight;
            if best.map_or(true, |b| self.credits[lane] > self.credits[b]) {
                best = Some(lane);
            }
        }

        let chosen = best?;
        self.credits[chosen] -= total;
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(priority: Priority, payload: &str) -> WorkItem {
        WorkItem::new("stage", priority, payload)
    }

    fn drain(lanes: &mut PriorityLanes) -> Vec<String> {
        std::iter::from_fn(|| lanes.pop_next())
            .map(|q| q.item.payload.0)
            .collect()
    }

    #[test]
    fn test_strict_ordering_and_fifo_within_class() {
        let mut lanes = PriorityLanes::new(ClassOrdering::Strict, Duration::from_secs(5));
        let now = Instant::now();
        lanes.push(item(Priority::Low, "low-1"), now);
        lanes.push(item(Priority::Medium, "med-1"), now);
        lanes.push(item(Priority::High, "high-1"), now);
        lanes.push(item(Priority::Low, "low-2"), now);
        lanes.push(item(Priority::High, "high-2"), now);

        assert_eq!(drain(&mut lanes), vec!["high-1", "high-2", "med-1", "low-1", "low-2"]);
    }

    #[test]
    fn test_aged_low_item_overtakes_medium() {
        let mut lanes = PriorityLanes::new(ClassOrdering::Strict, Duration::from_secs(5));
        let start = Instant::now();
        lanes.push(item(Priority::Low, "old-low"), start);
        lanes.push(item(Priority::Medium, "medium"), start + Duration::from_secs(4));

        assert_eq!(lanes.promote_aged(start + Duration::from_secs(5)), 1);
        assert_eq!(drain(&mut lanes), vec!["old-low", "medium"]);
    }

    #[test]
    fn test_promotion_accounts_for_time_in_class() {
        let mut lanes = PriorityLanes::new(ClassOrdering::Strict, Duration::from_secs(5));
        let start = Instant::now();
        lanes.push(item(Priority::Low, "patient"), start);

        // Two thresholds without a poll: LOW -> MEDIUM -> HIGH.
        assert_eq!(lanes.promote_aged(start + Duration::from_secs(10)), 2);
        assert_eq!(lanes.class_lengths(), [1, 0, 0]);
    }

    #[test]
    fn test_weighted_shares_dispatches() {
        let mut lanes = PriorityLanes::new(
            ClassOrdering::Weighted { weights: [2, 1, 1] },
            Duration::from_secs(60),
        );
        let now = Instant::now();
        for i in 0..4 {
            lanes.push(item(Priority::High, &format!("h{}", i)), now);
            lanes.push(item(Priority::Low, &format!("l{}", i)), now);
        }

        let first_three: Vec<String> = drain(&mut lanes).into_iter().take(3).collect();
        assert_eq!(first_three, vec!["h0", "l0", "h1"]);
    }

    #[test]
    fn test_weighted_keeps_same_class_age_order() {
        let mut lanes = PriorityLanes::new(
            ClassOrdering::Weighted { weights: [1, 1, 5] },
            Duration::from_secs(5),
        );
        let start = Instant::now();
        lanes.push(item(Priority::Low, "early"), start);
        lanes.push(item(Priority::Low, "late"), start + Duration::from_secs(3));
        lanes.promote_aged(start + Duration::from_secs(5));

        // The LOW lane has the larger share, but its slot goes to the older item.
        assert_eq!(drain(&mut lanes), vec!["early", "late"]);
    }

    #[test]
    fn test_remove_by_id() {
        let mut lanes = PriorityLanes::new(ClassOrdering::Strict, Duration::from_secs(5));
        let now = Instant::now();
        let target = item(Priority::Medium, "target");
        let id = target.id;
        lanes.push(item(Priority::Medium, "other"), now);
        lanes.push(target, now);

        assert_eq!(lanes.remove(id).unwrap().item.payload.0, "target");
        assert!(lanes.remove(id).is_none());
        assert_eq!(lanes.len(), 1);
    }
}
