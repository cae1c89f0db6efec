// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bottleneck detection.
//!
//! Each tick the [`ConstraintAnalyzer`] scores every stage with samples,
//! ranks them and names the current constraint, with hysteresis so that two
//! near-equal stages do not trade places on every tick.

mod analyzer;
mod score;

pub use analyzer::{
    AnalysisOutcome, AnalyzerSettings, ConstraintAnalyzer, CurrentConstraint, StaleRanking,
};
pub use score::{rank, score_stage, ConstraintScore, Ranking, ScoreWeights};
