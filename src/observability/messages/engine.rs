// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the flow engine and its stage workers.
//!
//! This module contains message types for logging events related to:
//! * Engine construction and analysis ticks
//! * Stage worker lifecycle
//! * Retry, failure and discard of dispatched work items

use crate::observability::messages::{StructuredLog, StructuredSpan};
use crate::types::WorkItemId;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Engine assembled from configuration.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_flowgate::observability::messages::engine::EngineStarted;
///
/// let msg = EngineStarted {
///     stage_count: 3,
///     workflow_count: 1,
///     dependency_count: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct EngineStarted {
    pub stage_count: usize,
    pub workflow_count: usize,
    pub dependency_count: usize,
}

impl Display for EngineStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Flow engine ready: {} stages, {} workflows, {} guarded dependencies",
            self.stage_count, self.workflow_count, self.dependency_count
        )
    }
}

impl StructuredLog for EngineStarted {
    fn log(&self) {
        tracing::info!(
            stage_count = self.stage_count,
            workflow_count = self.workflow_count,
            dependency_count = self.dependency_count,
            "{}", self
        );
    }
}

/// One analysis tick finished.
///
/// # Log Level
/// `debug!` - Per-tick detail
pub struct TickCompleted<'a> {
    pub constraint: Option<&'a str>,
    pub rate: Option<f64>,
    pub stale: bool,
    pub duration: std::time::Duration,
}

impl Display for TickCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match (self.constraint, self.rate) {
            (Some(constraint), Some(rate)) => write!(
                f,
                "Tick completed in {:?}: constraint '{}', admission rate {:.1}",
                self.duration, constraint, rate
            ),
            _ => write!(f, "Tick completed in {:?}: no constraint identified", self.duration),
        }
    }
}

impl StructuredLog for TickCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            constraint = self.constraint,
            rate = self.rate,
            stale = self.stale,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// A stage worker pool started dispatching.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct WorkerStarted<'a> {
    pub stage: &'a str,
    pub concurrency: usize,
}

impl Display for WorkerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker for stage '{}' started with concurrency {}",
            self.stage, self.concurrency
        )
    }
}

impl StructuredLog for WorkerStarted<'_> {
    fn log(&self) {
        tracing::info!(stage = self.stage, concurrency = self.concurrency, "{}", self);
    }
}

impl StructuredSpan for WorkerStarted<'_> {
    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stage_worker",
            span_name = name,
            stage = self.stage,
            concurrency = self.concurrency,
        )
    }
}

/// A stage worker pool drained and stopped.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct WorkerStopped<'a> {
    pub stage: &'a str,
    pub processed: u64,
}

impl Display for WorkerStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker for stage '{}' stopped after {} items",
            self.stage, self.processed
        )
    }
}

impl StructuredLog for WorkerStopped<'_> {
    fn log(&self) {
        tracing::info!(stage = self.stage, processed = self.processed, "{}", self);
    }
}

/// A work item whose action failed went back into its queue.
///
/// # Log Level
/// `info!` - Retry in progress
pub struct ItemRequeued<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
    pub retry: u32,
    pub max_retries: u32,
}

impl Display for ItemRequeued<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Requeued item {} in '{}' (retry {}/{})",
            self.item_id, self.stage, self.retry, self.max_retries
        )
    }
}

impl StructuredLog for ItemRequeued<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            item_id = %self.item_id,
            retry = self.retry,
            max_retries = self.max_retries,
            "{}", self
        );
    }
}

/// A work item reached a terminal failure.
///
/// # Log Level
/// `warn!` - Permanently failed after retries or compensation
pub struct ItemFailed<'a> {
    pub stage: &'a str,
    pub item_id: WorkItemId,
    pub reason: &'a str,
}

impl Display for ItemFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Item {} in '{}' failed permanently: {}",
            self.item_id, self.stage, self.reason
        )
    }
}

impl StructuredLog for ItemFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            item_id = %self.item_id,
            reason = self.reason,
            "{}", self
        );
    }
}
