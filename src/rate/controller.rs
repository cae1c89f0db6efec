// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::sync::Mutex;

use crate::config::consts::{
    DEFAULT_DAMPING_FACTOR, DEFAULT_GROWTH_FACTOR, DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK,
    DEFAULT_RATE_FLOOR,
};
use crate::observability::messages::rate::{RateAdjusted, RateHeld};
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSettings {
    pub low_watermark: f64,
    pub high_watermark: f64,
    /// Multiplier below 1 applied when occupancy is above the high watermark.
    pub damping_factor: f64,
    /// Multiplier above 1 applied when occupancy is below the low watermark.
    pub growth_factor: f64,
    pub floor: f64,
    /// Starting rate; the constraint's declared maximum when unset.
    pub initial_rate: Option<f64>,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            low_watermark: DEFAULT_LOW_WATERMARK,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            damping_factor: DEFAULT_DAMPING_FACTOR,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            floor: DEFAULT_RATE_FLOOR,
            initial_rate: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Reduced,
    Increased,
    Held,
}

/// Result of one rope tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateDecision {
    pub previous: f64,
    pub rate: f64,
    pub adjustment: Adjustment,
}

/// The rope: paces admission in front of the constraint from its buffer.
///
/// Each tick looks at how full the constraint's buffer is. Above the high
/// watermark the rate is damped, below the low watermark it grows, and in
/// between it holds. The result always stays within `[floor, capacity]`.
///
/// # Example
/// ```
/// use the_flowgate::rate::{Adjustment, RateController, RateSettings};
///
/// let rope = RateController::new(RateSettings::default(), 1000.0);
///
/// let decision = rope.tick("payment", 1000.0, 0.95);
/// assert_eq!(decision.rate, 800.0);
/// assert_eq!(decision.adjustment, Adjustment::Reduced);
///
/// let decision = rope.tick("payment", 1000.0, 0.5);
/// assert_eq!(decision.rate, 800.0);
/// assert_eq!(decision.adjustment, Adjustment::Held);
/// ```
#[derive(Debug)]
pub struct RateController {
    settings: RateSettings,
    rate: Mutex<f64>,
}

impl RateController {
    pub fn new(settings: RateSettings, initial_rate: f64) -> Self {
        let start = settings.initial_rate.unwrap_or(initial_rate).max(settings.floor);
        Self {
            settings,
            rate: Mutex::new(start),
        }
    }

    pub fn settings(&self) -> &RateSettings {
        &self.settings
    }

    pub fn rate(&self) -> f64 {
        *self.rate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adjust the rate from the constraint's capacity and buffer occupancy.
    ///
    /// `capacity` is the constraint stage's declared maximum throughput.
    pub fn tick(&self, constraint: &str, capacity: f64, occupancy: f64) -> RateDecision {
        let mut rate = self.rate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = *rate;

        let (raw, adjustment) = if occupancy > self.settings.high_watermark {
            (previous * self.settings.damping_factor, Adjustment::Reduced)
        } else if occupancy < self.settings.low_watermark {
            (previous * self.settings.growth_factor, Adjustment::Increased)
        } else {
            (previous, Adjustment::Held)
        };

        let next = self.bound(raw, capacity);
        *rate = next;
        drop(rate);

        let adjustment = if next == previous {
            Adjustment::Held
        } else {
            adjustment
        };

        match adjustment {
            Adjustment::Held => RateHeld {
                constraint,
                rate: next,
                occupancy,
            }
            .log(),
            _ => RateAdjusted {
                constraint,
                previous_rate: previous,
                new_rate: next,
                occupancy,
            }
            .log(),
        }

        RateDecision {
            previous,
            rate: next,
            adjustment,
        }
    }

    /// Move the rate back to `rate`, bounded as a tick would bound it.
    pub fn reset(&self, rate: f64, capacity: f64) {
        let bounded = self.bound(rate, capacity);
        *self.rate.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = bounded;
    }

    fn bound(&self, rate: f64, capacity: f64) -> f64 {
        let floor = self.settings.floor;
        let ceiling = if capacity.is_finite() { capacity.max(floor) } else { floor };
        let rate = if rate.is_finite() { rate } else { floor };
        rate.max(floor).min(ceiling)
    }
}
