// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the same event with typed fields at its
//! documented level.

use std::fmt::Display;
use tracing::Span;

pub mod admission;
pub mod circuit;
pub mod constraint;
pub mod engine;
pub mod metrics;
pub mod rate;
pub mod validation;
pub mod workflow;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the event at the message's level.
    fn log(&self);
}

/// A message that marks the start of longer-running work.
///
/// The span carries the message's fields, so events logged inside the work
/// are attributed to it.
pub trait StructuredSpan: StructuredLog {
    fn span(&self, name: &str) -> Span;
}

#[cfg(test)]
mod tests {
    use super::engine::WorkerStarted;
    use super::workflow::CompensationStarted;
    use super::StructuredSpan;

    #[test]
    fn test_work_spans_are_named_after_their_message() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let worker = WorkerStarted {
                stage: "payment",
                concurrency: 2,
            }
            .span("stage_worker");
            let metadata = worker.metadata().unwrap();
            assert_eq!(metadata.name(), "stage_worker");
            assert!(metadata.fields().field("stage").is_some());

            let rollback = CompensationStarted {
                instance: "order-1",
                state: "PAID",
                pending_steps: 2,
            }
            .span("rollback");
            let metadata = rollback.metadata().unwrap();
            assert_eq!(metadata.name(), "compensation");
            assert_eq!(*metadata.level(), tracing::Level::WARN);
        });
    }
}
