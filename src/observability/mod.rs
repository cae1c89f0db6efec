// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names identical between the log line and its span
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::admission` - Queue admission, dispatch, aging and capacity changes
//! * `messages::circuit` - Circuit guard state changes and denials
//! * `messages::constraint` - Bottleneck ranking and constraint selection
//! * `messages::engine` - Engine ticks and stage worker lifecycle
//! * `messages::metrics` - Sample ingestion and window expiry
//! * `messages::rate` - Rope rate adjustments
//! * `messages::validation` - Configuration validation lifecycle
//! * `messages::workflow` - Transitions, failures and compensation
//!
//! # Usage
//!
//! ```rust
//! use the_flowgate::observability::messages::StructuredLog;
//! use the_flowgate::observability::messages::rate::RateAdjusted;
//!
//! let msg = RateAdjusted {
//!     constraint: "payment",
//!     previous_rate: 1000.0,
//!     new_rate: 800.0,
//!     occupancy: 0.95,
//! };
//!
//! msg.log();
//! ```

pub mod messages;
