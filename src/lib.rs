// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod admission;     // bounded priority queues
pub mod circuit;       // dependency circuit guards
pub mod config;        // config, validation, engine builder
pub mod constraint;    // constraint scoring + hysteresis
pub mod engine;        // control tick + stage workers
pub mod errors;        // error handling
pub mod metrics;       // sliding-window stage metrics
pub mod observability;
pub mod rate;          // rope rate controller
pub mod traits;        // clock, downstream, store seams
pub mod types;         // identifiers
pub mod workflow;      // state machines with compensation
