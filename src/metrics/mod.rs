// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stage metrics in rolling windows.
//!
//! Stages report [`StageSample`]s; the [`MetricsAggregator`] timestamps them,
//! keeps them for a fixed horizon and summarizes them into [`StageMetrics`]
//! for the constraint analyzer.

mod aggregator;
mod sample;

pub use aggregator::{MetricsAggregator, MetricsSettings};
pub use sample::{StageMetrics, StageSample, Summary};
