// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::metrics::{StageSample, Summary};
use crate::traits::Clock;
use crate::types::StageId;

#[derive(Debug, Default)]
struct Tally {
    completed: u64,
    failed: u64,
    latencies_ms: Vec<f64>,
    busy: Duration,
}

/// Per-stage counters filled by workers between engine ticks.
///
/// Each [`OutcomeTally::flush`] turns the counts since the previous flush into
/// one [`StageSample`] per active stage and starts a fresh interval.
#[derive(Debug)]
pub struct OutcomeTally {
    tallies: HashMap<StageId, Mutex<Tally>>,
    workers: HashMap<StageId, usize>,
    last_flush: Mutex<Instant>,
    clock: Arc<dyn Clock>,
}

impl OutcomeTally {
    pub fn new<I>(stages: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (StageId, usize)>,
    {
        let workers: HashMap<StageId, usize> = stages.into_iter().collect();
        Self {
            tallies: workers
                .keys()
                .map(|id| (id.clone(), Mutex::new(Tally::default())))
                .collect(),
            workers,
            last_flush: Mutex::new(clock.now()),
            clock,
        }
    }

    pub fn record_success(&self, stage: &str, latency: Duration) {
        self.record(stage, latency, false);
    }

    pub fn record_failure(&self, stage: &str, latency: Duration) {
        self.record(stage, latency, true);
    }

    fn record(&self, stage: &str, latency: Duration, failed: bool) {
        let Some(tally) = self.tallies.get(stage) else {
            return;
        };
        let mut tally = tally.lock().unwrap_or_else(|p| p.into_inner());
        if failed {
            tally.failed += 1;
        } else {
            tally.completed += 1;
        }
        tally.latencies_ms.push(latency.as_secs_f64() * 1000.0);
        tally.busy += latency;
    }

    /// Close the current interval.
    ///
    /// `queue_depth` reports each stage's current backlog. Stages with neither
    /// outcomes nor backlog produce no sample.
    pub fn flush<F>(&self, queue_depth: F) -> Vec<(StageId, StageSample)>
    where
        F: Fn(&str) -> usize,
    {
        let now = self.clock.now();
        let elapsed = {
            let mut last = self.last_flush.lock().unwrap_or_else(|p| p.into_inner());
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };
        let seconds = elapsed.as_secs_f64().max(1e-3);

        let mut samples = Vec::new();
        for (stage, tally) in &self.tallies {
            let drained = std::mem::take(&mut *tally.lock().unwrap_or_else(|p| p.into_inner()));
            let depth = queue_depth(stage.as_str());
            let outcomes = drained.completed + drained.failed;
            if outcomes == 0 && depth == 0 {
                continue;
            }

            let mut latencies = drained.latencies_ms;
            let p95 = Summary::of(&mut latencies).p95;
            let workers = self.workers.get(stage).copied().unwrap_or(1).max(1);
            let error_rate = if outcomes == 0 {
                0.0
            } else {
                drained.failed as f64 / outcomes as f64
            };

            samples.push((
                stage.clone(),
                StageSample::new(
                    drained.completed as f64 / seconds,
                    Duration::from_secs_f64(p95.max(0.0) / 1000.0),
                    error_rate,
                    drained.busy.as_secs_f64() / (seconds * workers as f64),
                    depth,
                ),
            ));
        }
        samples.sort_by(|a, b| a.0.cmp(&b.0));
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ManualClock;

    #[test]
    fn test_flush_turns_outcomes_into_samples() {
        let clock = Arc::new(ManualClock::new());
        let tally = OutcomeTally::new(
            vec![(StageId::new("payment"), 2), (StageId::new("intake"), 1)],
            clock.clone(),
        );

        for _ in 0..8 {
            tally.record_success("payment", Duration::from_millis(100));
        }
        tally.record_failure("payment", Duration::from_millis(100));
        tally.record_failure("payment", Duration::from_millis(100));
        tally.record_success("unknown", Duration::from_millis(1));
        clock.advance(Duration::from_secs(2));

        let samples = tally.flush(|stage| if stage == "payment" { 3 } else { 0 });
        assert_eq!(samples.len(), 1);

        let (stage, sample) = &samples[0];
        assert_eq!(stage.as_str(), "payment");
        assert_eq!(sample.rps, 4.0);
        assert_eq!(sample.error_rate, 0.2);
        assert_eq!(sample.queue_depth, 3);
        assert!((sample.utilization - 0.25).abs() < 1e-9);
        assert!((sample.p95_latency.as_secs_f64() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_flush_starts_a_new_interval() {
        let clock = Arc::new(ManualClock::new());
        let tally = OutcomeTally::new(vec![(StageId::new("payment"), 1)], clock.clone());

        tally.record_success("payment", Duration::from_millis(10));
        clock.advance(Duration::from_secs(1));
        assert_eq!(tally.flush(|_| 0).len(), 1);

        clock.advance(Duration::from_secs(1));
        assert!(tally.flush(|_| 0).is_empty());
    }
}
