// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Admission-rate control in front of the current constraint.

mod controller;

pub use controller::{Adjustment, RateController, RateDecision, RateSettings};
