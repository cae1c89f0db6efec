// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in defaults for every optional configuration value.

/// Rolling metrics window (seconds)
pub const DEFAULT_METRICS_WINDOW_SECS: u64 = 60;
/// Retained samples per stage before the oldest are dropped
pub const DEFAULT_MAX_SAMPLES_PER_STAGE: usize = 4096;

/// Score weight for utilization
pub const DEFAULT_UTILIZATION_WEIGHT: f64 = 0.4;
/// Score weight for error rate
pub const DEFAULT_ERROR_RATE_WEIGHT: f64 = 0.2;
/// Score weight for latency against its target
pub const DEFAULT_LATENCY_WEIGHT: f64 = 0.2;
/// Score weight for downstream backpressure
pub const DEFAULT_BACKPRESSURE_WEIGHT: f64 = 0.2;
/// Tolerance when checking that weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
/// Score lead a challenger needs over the incumbent constraint
pub const DEFAULT_HYSTERESIS_MARGIN: f64 = 0.1;
/// Analyzer tick (seconds)
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 15;

/// Wait before a queued item is promoted one class (milliseconds)
pub const DEFAULT_AGING_THRESHOLD_MS: u64 = 5_000;
/// Upper bound on opt-in blocking admission (milliseconds)
pub const DEFAULT_BLOCKING_TIMEOUT_MS: u64 = 500;
/// Seconds of admitted work a queue may buffer at the current rate
pub const DEFAULT_BUFFER_SECONDS: f64 = 1.0;
/// Weighted ordering shares for HIGH / MEDIUM / LOW
pub const DEFAULT_CLASS_WEIGHTS: [u32; 3] = [6, 3, 1];

/// Occupancy below which the rope grows the rate
pub const DEFAULT_LOW_WATERMARK: f64 = 0.3;
/// Occupancy above which the rope damps the rate
pub const DEFAULT_HIGH_WATERMARK: f64 = 0.9;
/// Multiplier applied above the high watermark
pub const DEFAULT_DAMPING_FACTOR: f64 = 0.8;
/// Multiplier applied below the low watermark
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.2;
/// Lowest admission rate the rope will set (items per second)
pub const DEFAULT_RATE_FLOOR: f64 = 1.0;

/// Failure ratio above which a circuit opens
pub const DEFAULT_FAILURE_RATIO_THRESHOLD: f64 = 0.5;
/// Sliding window of recorded calls
pub const DEFAULT_CIRCUIT_WINDOW_SIZE: usize = 20;
/// Time an open circuit waits before allowing trials (seconds)
pub const DEFAULT_COOL_DOWN_SECS: u64 = 30;
/// Trial calls allowed while half-open
pub const DEFAULT_HALF_OPEN_TRIALS: u32 = 1;
/// Timeout applied to every guarded call (milliseconds)
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 2_000;

/// Worker concurrency when a stage does not set `workers`
pub const DEFAULT_STAGE_WORKERS: usize = 1;
/// Retries of a failed transition action before the instance is aborted
pub const DEFAULT_MAX_RETRIES: u32 = 2;
