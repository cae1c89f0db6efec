// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod admission;
mod circuit;
mod config;
mod metrics;
mod store;
mod workflow;

pub use admission::{RejectReason, Rejected};
pub use circuit::{CircuitOpen, GuardedCallError, UnknownDependency};
pub use config::{ConfigError, ValidationError};
pub use metrics::UnknownStage;
pub use store::StoreError;
pub use workflow::{ActionFailure, TransitionError};
