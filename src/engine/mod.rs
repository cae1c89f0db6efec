// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The running engine: the control tick that ties metrics, constraint
//! analysis and the rope together, plus the per-stage workers that drain
//! admission queues and report outcomes back into the metrics.

pub mod feedback;
mod flow_engine;
pub mod worker;

#[cfg(test)]
mod integration_tests;

pub use feedback::OutcomeTally;
pub use flow_engine::{EngineSettings, FlowEngine, TickReport};
pub use worker::StageWorker;
