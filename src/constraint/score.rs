// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::config::consts::{
    DEFAULT_BACKPRESSURE_WEIGHT, DEFAULT_ERROR_RATE_WEIGHT, DEFAULT_LATENCY_WEIGHT,
    DEFAULT_UTILIZATION_WEIGHT,
};
use crate::config::{StageSpec, StageTopology};
use crate::metrics::StageMetrics;
use crate::types::StageId;

/// Weights of the four score components. Validated to be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub utilization: f64,
    pub error_rate: f64,
    pub latency: f64,
    pub backpressure: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.utilization + self.error_rate + self.latency + self.backpressure
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            utilization: DEFAULT_UTILIZATION_WEIGHT,
            error_rate: DEFAULT_ERROR_RATE_WEIGHT,
            latency: DEFAULT_LATENCY_WEIGHT,
            backpressure: DEFAULT_BACKPRESSURE_WEIGHT,
        }
    }
}

/// How constrained one stage looks, with the inputs that produced the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintScore {
    pub stage: StageId,
    /// Weighted sum in `[0, 1]`.
    pub score: f64,
    pub utilization: f64,
    pub error_rate: f64,
    /// Mean reported p95 latency over the target, capped at 1.
    pub latency_ratio: f64,
    /// Fullest downstream queue, as a fraction of its capacity.
    pub backpressure: f64,
}

/// Scores ordered highest first; ties keep stage declaration order.
///
/// A ranking is immutable once built. Each analyzer tick produces a fresh one
/// that replaces the previous ranking wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    scores: Vec<ConstraintScore>,
    #[serde(skip)]
    computed_at: Option<Instant>,
}

impl Ranking {
    pub(crate) fn new(scores: Vec<ConstraintScore>, computed_at: Instant) -> Self {
        Self {
            scores,
            computed_at: Some(computed_at),
        }
    }

    pub fn scores(&self) -> &[ConstraintScore] {
        &self.scores
    }

    pub fn top(&self) -> Option<&ConstraintScore> {
        self.scores.first()
    }

    pub fn score_of(&self, stage: &str) -> Option<&ConstraintScore> {
        self.scores.iter().find(|s| s.stage.as_str() == stage)
    }

    pub fn computed_at(&self) -> Option<Instant> {
        self.computed_at
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

fn fraction(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0).min(1.0)
    } else {
        0.0
    }
}

/// Score one stage from its own snapshot and the snapshots of its downstream stages.
pub fn score_stage(
    metrics: &StageMetrics,
    spec: &StageSpec,
    snapshots: &HashMap<&str, &StageMetrics>,
    topology: &StageTopology,
    weights: &ScoreWeights,
) -> ConstraintScore {
    let target_ms = spec.latency_target.as_secs_f64() * 1000.0;
    let latency_ratio = if target_ms > 0.0 {
        fraction(metrics.latency_ms.mean / target_ms)
    } else {
        0.0
    };

    let backpressure = spec
        .downstream
        .iter()
        .filter_map(|down| {
            let capacity = topology.get(down.as_str())?.queue_capacity;
            let depth = snapshots.get(down.as_str())?.queue_depth.mean;
            Some(fraction(depth / capacity.max(1) as f64))
        })
        .fold(0.0, f64::max);

    let utilization = metrics.utilization.mean;
    let error_rate = metrics.error_rate.mean;

    let score = weights.utilization * utilization
        + weights.error_rate * error_rate
        + weights.latency * latency_ratio
        + weights.backpressure * backpressure;

    ConstraintScore {
        stage: spec.id.clone(),
        score: fraction(score),
        utilization,
        error_rate,
        latency_ratio,
        backpressure,
    }
}

/// Score every stage that has samples and order the result.
pub fn rank(
    snapshots: &[StageMetrics],
    topology: &StageTopology,
    weights: &ScoreWeights,
    now: Instant,
) -> Ranking {
    let by_stage: HashMap<&str, &StageMetrics> = snapshots
        .iter()
        .map(|m| (m.stage.as_str(), m))
        .collect();

    let mut scores: Vec<(usize, ConstraintScore)> = snapshots
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| {
            let position = topology.position(m.stage.as_str())?;
            let spec = topology.get(m.stage.as_str())?;
            Some((position, score_stage(m, spec, &by_stage, topology, weights)))
        })
        .collect();

    scores.sort_by(|(pa, a), (pb, b)| b.score.total_cmp(&a.score).then(pa.cmp(pb)));

    Ranking::new(scores.into_iter().map(|(_, s)| s).collect(), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Summary;
    use std::time::Duration;

    fn spec(id: &str, downstream: &[&str], capacity: usize) -> StageSpec {
        StageSpec {
            id: StageId::new(id),
            max_throughput: 100.0,
            latency_target: Duration::from_millis(100),
            queue_capacity: capacity,
            high_priority_reserve: 0,
            workers: 1,
            downstream: downstream.iter().map(|d| StageId::new(*d)).collect(),
            circuit: None,
        }
    }

    fn flat(value: f64) -> Summary {
        Summary {
            mean: value,
            p95: value,
            max: value,
        }
    }

    fn metrics(id: &str, utilization: f64, latency_ms: f64, depth: f64) -> StageMetrics {
        StageMetrics {
            stage: StageId::new(id),
            sample_count: 1,
            window: Duration::from_secs(60),
            rps: flat(10.0),
            latency_ms: flat(latency_ms),
            error_rate: flat(0.0),
            utilization: flat(utilization),
            queue_depth: flat(depth),
        }
    }

    fn topology() -> StageTopology {
        StageTopology::new(vec![
            spec("intake", &["payment"], 10),
            spec("payment", &[], 10),
        ])
    }

    #[test]
    fn test_score_combines_weighted_components() {
        let topology = topology();
        let snapshots = vec![metrics("intake", 0.5, 200.0, 0.0), metrics("payment", 0.0, 0.0, 5.0)];
        let ranking = rank(&snapshots, &topology, &ScoreWeights::default(), Instant::now());

        let intake = ranking.score_of("intake").unwrap();
        assert_eq!(intake.latency_ratio, 1.0);
        assert_eq!(intake.backpressure, 0.5);
        // 0.4 * 0.5 + 0.2 * 0 + 0.2 * 1 + 0.2 * 0.5
        assert!((intake.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let topology = topology();
        let snapshots = vec![metrics("payment", 0.5, 0.0, 0.0), metrics("intake", 0.5, 0.0, 0.0)];
        let ranking = rank(&snapshots, &topology, &ScoreWeights::default(), Instant::now());

        let order: Vec<&str> = ranking.scores().iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(order, vec!["intake", "payment"]);
    }

    #[test]
    fn test_stages_without_samples_are_not_ranked() {
        let topology = topology();
        let mut empty = metrics("intake", 0.0, 0.0, 0.0);
        empty.sample_count = 0;
        let snapshots = vec![empty, metrics("payment", 0.3, 0.0, 0.0)];

        let ranking = rank(&snapshots, &topology, &ScoreWeights::default(), Instant::now());
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking.top().unwrap().stage.as_str(), "payment");
    }
}
