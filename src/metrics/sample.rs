// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::types::StageId;

/// One observation reported by a stage.
///
/// Fractions (`error_rate`, `utilization`) are expected in `[0, 1]`; values
/// outside that range, and non-finite values, are sanitized on record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageSample {
    /// Completed requests per second over the reporting interval.
    pub rps: f64,
    pub p95_latency: Duration,
    pub error_rate: f64,
    /// Fraction of worker capacity that was busy.
    pub utilization: f64,
    pub queue_depth: usize,
}

impl StageSample {
    pub fn new(
        rps: f64,
        p95_latency: Duration,
        error_rate: f64,
        utilization: f64,
        queue_depth: usize,
    ) -> Self {
        Self {
            rps,
            p95_latency,
            error_rate,
            utilization,
            queue_depth,
        }
    }

    pub(crate) fn sanitized(self) -> Self {
        Self {
            rps: finite_or_zero(self.rps).max(0.0),
            p95_latency: self.p95_latency,
            error_rate: unit_fraction(self.error_rate),
            utilization: unit_fraction(self.utilization),
            queue_depth: self.queue_depth,
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn unit_fraction(value: f64) -> f64 {
    finite_or_zero(value).max(0.0).min(1.0)
}

/// A sample stamped with the aggregator's clock at the moment it was recorded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimedSample {
    pub recorded_at: Instant,
    pub sample: StageSample,
}

/// Mean, 95th percentile and maximum of one measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub p95: f64,
    pub max: f64,
}

impl Summary {
    /// Summarize a set of values; an empty set yields all zeros.
    ///
    /// The percentile uses the nearest-rank method.
    pub fn of(values: &mut [f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let len = values.len();
        let mean = values.iter().sum::<f64>() / len as f64;
        let rank = ((0.95 * len as f64).ceil() as usize).clamp(1, len);

        Self {
            mean,
            p95: values[rank - 1],
            max: values[len - 1],
        }
    }
}

/// Aggregated view of one stage over its non-expired samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageMetrics {
    pub stage: StageId,
    pub sample_count: usize,
    /// Horizon the summaries were computed over.
    pub window: Duration,
    pub rps: Summary,
    /// Reported p95 latencies, in milliseconds.
    pub latency_ms: Summary,
    pub error_rate: Summary,
    pub utilization: Summary,
    pub queue_depth: Summary,
}

impl StageMetrics {
    pub(crate) fn from_samples<'a, I>(stage: StageId, window: Duration, samples: I) -> Self
    where
        I: IntoIterator<Item = &'a TimedSample>,
    {
        let mut rps = Vec::new();
        let mut latency = Vec::new();
        let mut errors = Vec::new();
        let mut utilization = Vec::new();
        let mut depth = Vec::new();

        for timed in samples {
            let s = &timed.sample;
            rps.push(s.rps);
            latency.push(s.p95_latency.as_secs_f64() * 1000.0);
            errors.push(s.error_rate);
            utilization.push(s.utilization);
            depth.push(s.queue_depth as f64);
        }

        Self {
            stage,
            sample_count: rps.len(),
            window,
            rps: Summary::of(&mut rps),
            latency_ms: Summary::of(&mut latency),
            error_rate: Summary::of(&mut errors),
            utilization: Summary::of(&mut utilization),
            queue_depth: Summary::of(&mut depth),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_nearest_rank_percentile() {
        let mut values: Vec<f64> = (1..=20).map(f64::from).collect();
        let summary = Summary::of(&mut values);
        assert_eq!(summary.p95, 19.0);
        assert_eq!(summary.max, 20.0);
        assert!((summary.mean - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_single_value() {
        let summary = Summary::of(&mut [0.7]);
        assert_eq!(summary.mean, 0.7);
        assert_eq!(summary.p95, 0.7);
        assert_eq!(summary.max, 0.7);
    }

    #[test]
    fn test_summary_empty_is_zero() {
        assert_eq!(Summary::of(&mut []), Summary::default());
    }

    #[test]
    fn test_sanitize_clamps_fractions_and_non_finite() {
        let sample = StageSample::new(f64::NAN, Duration::from_millis(5), 1.7, -0.2, 3).sanitized();
        assert_eq!(sample.rps, 0.0);
        assert_eq!(sample.error_rate, 1.0);
        assert_eq!(sample.utilization, 0.0);
        assert_eq!(sample.queue_depth, 3);
    }
}
