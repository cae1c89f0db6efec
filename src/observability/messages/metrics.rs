// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for metric ingestion.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A sample was appended to a stage window.
///
/// # Log Level
/// `trace!` - High-volume ingestion detail
pub struct SampleRecorded<'a> {
    pub stage: &'a str,
    pub window_len: usize,
}

impl Display for SampleRecorded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Recorded sample for stage '{}' ({} samples in window)",
            self.stage, self.window_len
        )
    }
}

impl StructuredLog for SampleRecorded<'_> {
    fn log(&self) {
        tracing::trace!(
            stage = self.stage,
            window_len = self.window_len,
            "{}", self
        );
    }
}

/// Samples fell out of the rolling window and were purged.
///
/// # Log Level
/// `debug!` - Window maintenance
pub struct SamplesExpired<'a> {
    pub stage: &'a str,
    pub expired: usize,
    pub remaining: usize,
}

impl Display for SamplesExpired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Purged {} expired samples for stage '{}' ({} remaining)",
            self.expired, self.stage, self.remaining
        )
    }
}

impl StructuredLog for SamplesExpired<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            expired = self.expired,
            remaining = self.remaining,
            "{}", self
        );
    }
}

/// A sample was reported for a stage outside the registered set.
///
/// # Log Level
/// `warn!` - Misconfigured reporter
pub struct UnknownStageReported<'a> {
    pub stage: &'a str,
}

impl Display for UnknownStageReported<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Ignoring sample for unknown stage '{}'", self.stage)
    }
}

impl StructuredLog for UnknownStageReported<'_> {
    fn log(&self) {
        tracing::warn!(stage = self.stage, "{}", self);
    }
}
