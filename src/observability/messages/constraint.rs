// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for bottleneck ranking.
//!
//! This module contains message types for logging events related to:
//! * Ranking recomputation on each analysis tick
//! * Changes of the current constraint
//! * Hysteresis holding an incumbent in place
//! * Stale rankings retained when no samples are available

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A fresh ranking replaced the previous one.
///
/// # Log Level
/// `debug!` - Per-tick detail
pub struct RankingComputed<'a> {
    pub ranked_count: usize,
    pub top_stage: &'a str,
    pub top_score: f64,
}

impl Display for RankingComputed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ranked {} stages; highest constraint score {:.3} at '{}'",
            self.ranked_count, self.top_score, self.top_stage
        )
    }
}

impl StructuredLog for RankingComputed<'_> {
    fn log(&self) {
        tracing::debug!(
            ranked_count = self.ranked_count,
            top_stage = self.top_stage,
            top_score = self.top_score,
            "{}", self
        );
    }
}

/// The current constraint moved to a different stage.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_flowgate::observability::messages::constraint::ConstraintChanged;
///
/// let msg = ConstraintChanged {
///     previous: Some("inventory"),
///     current: "payment",
///     score: 0.92,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ConstraintChanged<'a> {
    pub previous: Option<&'a str>,
    pub current: &'a str,
    pub score: f64,
}

impl Display for ConstraintChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.previous {
            Some(previous) => write!(
                f,
                "Constraint moved from '{}' to '{}' (score {:.3})",
                previous, self.current, self.score
            ),
            None => write!(
                f,
                "Constraint identified at '{}' (score {:.3})",
                self.current, self.score
            ),
        }
    }
}

impl StructuredLog for ConstraintChanged<'_> {
    fn log(&self) {
        tracing::info!(
            previous = self.previous,
            current = self.current,
            score = self.score,
            "{}", self
        );
    }
}

/// A challenger outscored the incumbent but not by more than the margin.
///
/// # Log Level
/// `debug!` - Hysteresis detail
pub struct ConstraintRetained<'a> {
    pub incumbent: &'a str,
    pub incumbent_score: f64,
    pub challenger: &'a str,
    pub challenger_score: f64,
    pub margin: f64,
}

impl Display for ConstraintRetained<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Keeping '{}' ({:.3}) as constraint; '{}' ({:.3}) is within margin {:.3}",
            self.incumbent, self.incumbent_score, self.challenger, self.challenger_score, self.margin
        )
    }
}

impl StructuredLog for ConstraintRetained<'_> {
    fn log(&self) {
        tracing::debug!(
            incumbent = self.incumbent,
            incumbent_score = self.incumbent_score,
            challenger = self.challenger,
            challenger_score = self.challenger_score,
            margin = self.margin,
            "{}", self
        );
    }
}

/// No ranking could be computed; the previous one stays in effect.
///
/// # Log Level
/// `warn!` - Degraded but operating
pub struct StaleRankingRetained<'a> {
    pub reason: &'a str,
    pub retained_age: Option<std::time::Duration>,
}

impl Display for StaleRankingRetained<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.retained_age {
            Some(age) => write!(
                f,
                "Stale ranking: {}; keeping ranking computed {:?} ago",
                self.reason, age
            ),
            None => write!(f, "Stale ranking: {}; no ranking computed yet", self.reason),
        }
    }
}

impl StructuredLog for StaleRankingRetained<'_> {
    fn log(&self) {
        tracing::warn!(
            reason = self.reason,
            retained_age_ms = self.retained_age.map(|age| age.as_millis() as u64),
            "{}", self
        );
    }
}
