// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-dependency circuit breakers.

mod guard;
mod registry;

pub use guard::{CallPermit, CircuitGuard, CircuitSettings, CircuitSnapshot, CircuitState};
pub use registry::CircuitRegistry;
