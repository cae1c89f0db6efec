// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::consts::{DEFAULT_MAX_SAMPLES_PER_STAGE, DEFAULT_METRICS_WINDOW_SECS};
use crate::errors::UnknownStage;
use crate::metrics::sample::{StageMetrics, StageSample, TimedSample};
use crate::observability::messages::metrics::{SampleRecorded, SamplesExpired};
use crate::observability::messages::StructuredLog;
use crate::traits::Clock;
use crate::types::StageId;

/// Rolling-window parameters shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSettings {
    /// Samples older than this are never reported.
    pub window: Duration,
    /// Hard cap on retained samples per stage; oldest are dropped first.
    pub max_samples_per_stage: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_METRICS_WINDOW_SECS),
            max_samples_per_stage: DEFAULT_MAX_SAMPLES_PER_STAGE,
        }
    }
}

/// Per-stage rolling windows of reported samples.
///
/// The stage set is closed: it is fixed when the aggregator is built and every
/// call naming another stage fails with [`UnknownStage`]. Each stage has its own
/// lock, so recording for one stage never waits on another, and recording never
/// touches I/O.
///
/// Expired samples are purged lazily, whenever a stage's window is touched.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use the_flowgate::metrics::{MetricsAggregator, MetricsSettings, StageSample};
/// use the_flowgate::traits::ManualClock;
/// use the_flowgate::types::StageId;
///
/// let clock = Arc::new(ManualClock::new());
/// let metrics = MetricsAggregator::new(
///     vec![StageId::new("payment")],
///     MetricsSettings::default(),
///     clock.clone(),
/// );
///
/// metrics
///     .record("payment", StageSample::new(120.0, Duration::from_millis(80), 0.01, 0.7, 4))
///     .unwrap();
///
/// let snapshot = metrics.snapshot("payment").unwrap();
/// assert_eq!(snapshot.sample_count, 1);
/// assert!(metrics.snapshot("shipping").is_err());
/// ```
#[derive(Debug)]
pub struct MetricsAggregator {
    stages: Vec<StageId>,
    windows: HashMap<StageId, Mutex<VecDeque<TimedSample>>>,
    settings: MetricsSettings,
    clock: Arc<dyn Clock>,
}

impl MetricsAggregator {
    pub fn new(stages: Vec<StageId>, settings: MetricsSettings, clock: Arc<dyn Clock>) -> Self {
        let windows = stages
            .iter()
            .map(|stage| (stage.clone(), Mutex::new(VecDeque::new())))
            .collect();

        Self {
            stages,
            windows,
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &MetricsSettings {
        &self.settings
    }

    /// Stage ids in declaration order.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Append a sample, stamped with the aggregator's clock.
    pub fn record(&self, stage: &str, sample: StageSample) -> Result<(), UnknownStage> {
        let (_, window) = self.window_for(stage)?;
        let now = self.clock.now();

        let mut samples = window.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.purge(stage, &mut samples, now);

        samples.push_back(TimedSample {
            recorded_at: now,
            sample: sample.sanitized(),
        });
        while samples.len() > self.settings.max_samples_per_stage {
            samples.pop_front();
        }

        SampleRecorded {
            stage,
            window_len: samples.len(),
        }
        .log();
        Ok(())
    }

    /// Summaries over the stage's non-expired samples.
    pub fn snapshot(&self, stage: &str) -> Result<StageMetrics, UnknownStage> {
        let (id, window) = self.window_for(stage)?;
        let now = self.clock.now();

        let mut samples = window.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.purge(stage, &mut samples, now);

        Ok(StageMetrics::from_samples(
            id.clone(),
            self.settings.window,
            samples.iter(),
        ))
    }

    /// Snapshots of every stage, in declaration order.
    pub fn snapshot_all(&self) -> Vec<StageMetrics> {
        self.stages
            .iter()
            .filter_map(|stage| self.snapshot(stage.as_str()).ok())
            .collect()
    }

    fn window_for(
        &self,
        stage: &str,
    ) -> Result<(&StageId, &Mutex<VecDeque<TimedSample>>), UnknownStage> {
        self.windows
            .get_key_value(stage)
            .ok_or_else(|| UnknownStage(stage.to_string()))
    }

    fn purge(&self, stage: &str, samples: &mut VecDeque<TimedSample>, now: Instant) {
        let before = samples.len();
        while let Some(oldest) = samples.front() {
            if now.saturating_duration_since(oldest.recorded_at) > self.settings.window {
                samples.pop_front();
            } else {
                break;
            }
        }

        let expired = before - samples.len();
        if expired > 0 {
            SamplesExpired {
                stage,
                expired,
                remaining: samples.len(),
            }
            .log();
        }
    }
}
