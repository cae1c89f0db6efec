// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the rope rate controller.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// The admission rate in front of the constraint changed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RateAdjusted<'a> {
    pub constraint: &'a str,
    pub previous_rate: f64,
    pub new_rate: f64,
    pub occupancy: f64,
}

impl Display for RateAdjusted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Admission rate for constraint '{}' {:.1} -> {:.1} (buffer occupancy {:.0}%)",
            self.constraint,
            self.previous_rate,
            self.new_rate,
            self.occupancy * 100.0
        )
    }
}

impl StructuredLog for RateAdjusted<'_> {
    fn log(&self) {
        tracing::info!(
            constraint = self.constraint,
            previous_rate = self.previous_rate,
            new_rate = self.new_rate,
            occupancy = self.occupancy,
            "{}", self
        );
    }
}

/// The occupancy sat inside the target band; the rate is unchanged.
///
/// # Log Level
/// `debug!` - Per-tick detail
pub struct RateHeld<'a> {
    pub constraint: &'a str,
    pub rate: f64,
    pub occupancy: f64,
}

impl Display for RateHeld<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Admission rate for constraint '{}' held at {:.1} (buffer occupancy {:.0}%)",
            self.constraint,
            self.rate,
            self.occupancy * 100.0
        )
    }
}

impl StructuredLog for RateHeld<'_> {
    fn log(&self) {
        tracing::debug!(
            constraint = self.constraint,
            rate = self.rate,
            occupancy = self.occupancy,
            "{}", self
        );
    }
}
