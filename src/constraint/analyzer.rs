// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::consts::{DEFAULT_HYSTERESIS_MARGIN, DEFAULT_TICK_INTERVAL_SECS};
use crate::config::StageTopology;
use crate::constraint::score::{rank, Ranking, ScoreWeights};
use crate::metrics::StageMetrics;
use crate::observability::messages::constraint::{
    ConstraintChanged, ConstraintRetained, RankingComputed, StaleRankingRetained,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Clock;
use crate::types::StageId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    pub weights: ScoreWeights,
    /// Lead a challenger needs over the incumbent to displace it.
    pub hysteresis_margin: f64,
    pub tick_interval: Duration,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            hysteresis_margin: DEFAULT_HYSTERESIS_MARGIN,
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
        }
    }
}

/// The stage currently treated as the system's constraint.
#[derive(Debug, Clone)]
pub struct CurrentConstraint {
    pub stage: StageId,
    /// The stage's score in `ranking`.
    pub score: f64,
    pub ranking: Arc<Ranking>,
}

/// Warning: no stage had samples, so the previous ranking was kept.
#[derive(Debug, Clone)]
pub struct StaleRanking {
    pub retained: Option<CurrentConstraint>,
    /// Age of the retained ranking, if there is one.
    pub retained_age: Option<Duration>,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Ranked {
        current: CurrentConstraint,
        /// The previous constraint, when this tick replaced it.
        displaced: Option<StageId>,
    },
    Stale(StaleRanking),
}

impl AnalysisOutcome {
    pub fn current(&self) -> Option<&CurrentConstraint> {
        match self {
            AnalysisOutcome::Ranked { current, .. } => Some(current),
            AnalysisOutcome::Stale(stale) => stale.retained.as_ref(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, AnalysisOutcome::Stale(_))
    }
}

#[derive(Debug, Default)]
struct ConstraintView {
    current: Option<CurrentConstraint>,
}

/// Ranks stages by constraint score and tracks the current constraint.
///
/// Readers get the last published view; `analyze` builds a new ranking and
/// swaps it in whole. A challenger only displaces the incumbent when its score
/// is higher by more than the hysteresis margin.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use the_flowgate::config::StageTopology;
/// use the_flowgate::constraint::{AnalyzerSettings, ConstraintAnalyzer};
/// use the_flowgate::traits::SystemClock;
///
/// let topology = Arc::new(StageTopology::new(vec![]));
/// let analyzer = ConstraintAnalyzer::new(topology, AnalyzerSettings::default(), Arc::new(SystemClock));
///
/// // Nothing reported yet: the outcome is a stale-ranking warning, not an error.
/// assert!(analyzer.analyze(&[]).is_stale());
/// assert!(analyzer.current().is_none());
/// ```
#[derive(Debug)]
pub struct ConstraintAnalyzer {
    topology: Arc<StageTopology>,
    settings: AnalyzerSettings,
    view: RwLock<Arc<ConstraintView>>,
    clock: Arc<dyn Clock>,
}

impl ConstraintAnalyzer {
    pub fn new(
        topology: Arc<StageTopology>,
        settings: AnalyzerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            topology,
            settings,
            view: RwLock::new(Arc::new(ConstraintView::default())),
            clock,
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// The last published constraint, if any tick has produced one.
    pub fn current(&self) -> Option<CurrentConstraint> {
        self.load().current.clone()
    }

    pub fn ranking(&self) -> Option<Arc<Ranking>> {
        self.load().current.as_ref().map(|c| Arc::clone(&c.ranking))
    }

    /// Rank the given snapshots and publish the new current constraint.
    pub fn analyze(&self, snapshots: &[StageMetrics]) -> AnalysisOutcome {
        let now = self.clock.now();
        let ranking = rank(snapshots, &self.topology, &self.settings.weights, now);

        let Some(top) = ranking.top().cloned() else {
            let retained = self.current();
            let retained_age = retained
                .as_ref()
                .and_then(|c| c.ranking.computed_at())
                .map(|at| now.saturating_duration_since(at));
            StaleRankingRetained {
                reason: "no stage reported samples inside the window",
                retained_age,
            }
            .log();
            return AnalysisOutcome::Stale(StaleRanking {
                retained,
                retained_age,
            });
        };

        RankingComputed {
            ranked_count: ranking.len(),
            top_stage: top.stage.as_str(),
            top_score: top.score,
        }
        .log();

        let ranking = Arc::new(ranking);
        let mut guard = self.view.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let incumbent = guard.current.as_ref().map(|c| c.stage.clone());

        let (stage, score) = match incumbent
            .as_ref()
            .and_then(|stage| ranking.score_of(stage.as_str()))
        {
            Some(held) if held.stage == top.stage => (held.stage.clone(), held.score),
            Some(held) if top.score - held.score <= self.settings.hysteresis_margin => {
                ConstraintRetained {
                    incumbent: held.stage.as_str(),
                    incumbent_score: held.score,
                    challenger: top.stage.as_str(),
                    challenger_score: top.score,
                    margin: self.settings.hysteresis_margin,
                }
                .log();
                (held.stage.clone(), held.score)
            }
            _ => (top.stage.clone(), top.score),
        };

        let displaced = incumbent.filter(|previous| *previous != stage);
        if incumbent_changed(&guard.current, &stage) {
            ConstraintChanged {
                previous: displaced.as_ref().map(StageId::as_str),
                current: stage.as_str(),
                score,
            }
            .log();
        }

        let current = CurrentConstraint {
            stage,
            score,
            ranking,
        };
        *guard = Arc::new(ConstraintView {
            current: Some(current.clone()),
        });

        AnalysisOutcome::Ranked { current, displaced }
    }

    fn load(&self) -> Arc<ConstraintView> {
        let guard = self.view.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }
}

fn incumbent_changed(previous: &Option<CurrentConstraint>, next: &StageId) -> bool {
    previous.as_ref().map_or(true, |c| c.stage != *next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSpec;
    use crate::metrics::Summary;
    use crate::traits::ManualClock;

    fn spec(id: &str) -> StageSpec {
        StageSpec {
            id: StageId::new(id),
            max_throughput: 100.0,
            latency_target: Duration::from_millis(100),
            queue_capacity: 10,
            high_priority_reserve: 0,
            workers: 1,
            downstream: vec![],
            circuit: None,
        }
    }

    /// Metrics whose score is exactly `score` under utilization-only weights.
    fn scored(id: &str, score: f64) -> StageMetrics {
        let flat = |v: f64| Summary {
            mean: v,
            p95: v,
            max: v,
        };
        StageMetrics {
            stage: StageId::new(id),
            sample_count: 1,
            window: Duration::from_secs(60),
            rps: flat(1.0),
            latency_ms: flat(0.0),
            error_rate: flat(0.0),
            utilization: flat(score),
            queue_depth: flat(0.0),
        }
    }

    fn analyzer(clock: Arc<ManualClock>) -> ConstraintAnalyzer {
        let topology = Arc::new(StageTopology::new(vec![spec("a"), spec("b"), spec("c")]));
        let settings = AnalyzerSettings {
            weights: ScoreWeights {
                utilization: 1.0,
                error_rate: 0.0,
                latency: 0.0,
                backpressure: 0.0,
            },
            hysteresis_margin: 0.1,
            tick_interval: Duration::from_secs(15),
        };
        ConstraintAnalyzer::new(topology, settings, clock)
    }

    #[test]
    fn test_first_tick_takes_top_stage() {
        let analyzer = analyzer(Arc::new(ManualClock::new()));
        let outcome = analyzer.analyze(&[scored("a", 0.2), scored("b", 0.7)]);

        let current = outcome.current().unwrap();
        assert_eq!(current.stage.as_str(), "b");
        assert_eq!(current.ranking.len(), 2);
    }

    #[test]
    fn test_incumbent_kept_inside_margin() {
        let analyzer = analyzer(Arc::new(ManualClock::new()));
        analyzer.analyze(&[scored("a", 0.5), scored("b", 0.85)]);

        let outcome = analyzer.analyze(&[scored("a", 0.9), scored("b", 0.85)]);
        match outcome {
            AnalysisOutcome::Ranked { current, displaced } => {
                assert_eq!(current.stage.as_str(), "b");
                assert!((current.score - 0.85).abs() < 1e-9);
                assert!(displaced.is_none());
                assert_eq!(current.ranking.top().unwrap().stage.as_str(), "a");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_challenger_beyond_margin_displaces() {
        let analyzer = analyzer(Arc::new(ManualClock::new()));
        analyzer.analyze(&[scored("a", 0.3), scored("b", 0.6)]);

        let outcome = analyzer.analyze(&[scored("a", 0.95), scored("b", 0.6)]);
        match outcome {
            AnalysisOutcome::Ranked { current, displaced } => {
                assert_eq!(current.stage.as_str(), "a");
                assert_eq!(displaced.unwrap().as_str(), "b");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_incumbent_without_samples_is_replaced() {
        let analyzer = analyzer(Arc::new(ManualClock::new()));
        analyzer.analyze(&[scored("a", 0.9)]);

        let outcome = analyzer.analyze(&[scored("c", 0.1)]);
        assert_eq!(outcome.current().unwrap().stage.as_str(), "c");
    }

    #[test]
    fn test_no_samples_keeps_previous_ranking() {
        let clock = Arc::new(ManualClock::new());
        let analyzer = analyzer(clock.clone());
        analyzer.analyze(&[scored("a", 0.4)]);
        clock.advance(Duration::from_secs(15));

        let outcome = analyzer.analyze(&[]);
        match outcome {
            AnalysisOutcome::Stale(stale) => {
                assert_eq!(stale.retained.unwrap().stage.as_str(), "a");
                assert_eq!(stale.retained_age, Some(Duration::from_secs(15)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(analyzer.current().unwrap().stage.as_str(), "a");
    }
}
