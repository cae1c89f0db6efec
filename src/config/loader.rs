// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::admission::{AdmissionSettings, ClassOrdering};
use crate::circuit::CircuitSettings;
use crate::config::consts::*;
use crate::config::{StageSpec, StageTopology};
use crate::constraint::{AnalyzerSettings, ScoreWeights};
use crate::errors::ConfigError;
use crate::metrics::MetricsSettings;
use crate::rate::RateSettings;
use crate::types::{DependencyId, StageId};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the flow engine.
///
/// Describes the stage topology, the tuning of every control loop, the
/// guarded dependencies and the workflow tables. Only `stages` is required;
/// every other section falls back to the defaults in [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// stages:
///   - id: intake
///     max_throughput: 500
///     latency_target_ms: 50
///     queue_capacity: 200
///     downstream: [payment]
///   - id: payment
///     max_throughput: 120
///     latency_target_ms: 250
///     queue_capacity: 100
///     circuit: payment-gateway
/// analyzer:
///   hysteresis_margin: 0.1
/// circuits:
///   dependencies:
///     - id: payment-gateway
///       cool_down_ms: 10000
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub rate_controller: RateControllerConfig,
    #[serde(default)]
    pub circuits: CircuitsConfig,
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

impl Config {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn stage_specs(&self) -> Vec<StageSpec> {
        self.stages.iter().map(StageConfig::to_spec).collect()
    }

    pub fn topology(&self) -> StageTopology {
        StageTopology::new(self.stage_specs())
    }

    /// Effective settings for every declared dependency, in declaration order.
    pub fn circuit_settings(&self) -> Vec<(DependencyId, CircuitSettings)> {
        self.circuits
            .dependencies
            .iter()
            .map(|dep| {
                (
                    DependencyId::new(&dep.id),
                    dep.overrides.settings(&self.circuits.defaults),
                )
            })
            .collect()
    }
}

/// A single pipeline stage.
///
/// # Example
/// ```yaml
/// id: fulfillment
/// max_throughput: 80
/// latency_target_ms: 400
/// queue_capacity: 50
/// workers: 4
/// high_priority_reserve: 5
/// downstream: [shipping]
/// circuit: warehouse
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub id: String,
    pub max_throughput: f64,
    pub latency_target_ms: u64,
    pub queue_capacity: usize,
    #[serde(default)]
    pub downstream: Vec<String>,
    pub circuit: Option<String>,
    pub workers: Option<usize>,
    pub high_priority_reserve: Option<usize>,
}

impl StageConfig {
    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_STAGE_WORKERS)
    }

    pub fn get_high_priority_reserve(&self) -> usize {
        self.high_priority_reserve.unwrap_or(0)
    }

    pub fn to_spec(&self) -> StageSpec {
        StageSpec {
            id: StageId::new(&self.id),
            max_throughput: self.max_throughput,
            latency_target: Duration::from_millis(self.latency_target_ms),
            queue_capacity: self.queue_capacity,
            high_priority_reserve: self.get_high_priority_reserve(),
            workers: self.get_workers(),
            downstream: self.downstream.iter().map(StageId::new).collect(),
            circuit: self.circuit.as_deref().map(DependencyId::new),
        }
    }
}

/// Sliding-window settings for the metrics aggregator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub window_seconds: Option<u64>,
    pub max_samples_per_stage: Option<usize>,
}

impl MetricsConfig {
    pub fn get_window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.unwrap_or(DEFAULT_METRICS_WINDOW_SECS))
    }

    pub fn get_max_samples_per_stage(&self) -> usize {
        self.max_samples_per_stage.unwrap_or(DEFAULT_MAX_SAMPLES_PER_STAGE)
    }

    pub fn settings(&self) -> MetricsSettings {
        MetricsSettings {
            window: self.get_window(),
            max_samples_per_stage: self.get_max_samples_per_stage(),
        }
    }
}

/// Constraint analyzer tuning.
///
/// # Example
/// ```yaml
/// analyzer:
///   weights: { utilization: 0.5, error_rate: 0.1, latency: 0.2, backpressure: 0.2 }
///   hysteresis_margin: 0.05
///   tick_interval_seconds: 5
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzerConfig {
    pub weights: Option<WeightsConfig>,
    pub hysteresis_margin: Option<f64>,
    pub tick_interval_seconds: Option<u64>,
}

/// Score weights; when given, all four must be set.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeightsConfig {
    pub utilization: f64,
    pub error_rate: f64,
    pub latency: f64,
    pub backpressure: f64,
}

impl AnalyzerConfig {
    pub fn get_weights(&self) -> ScoreWeights {
        self.weights
            .map(|w| ScoreWeights {
                utilization: w.utilization,
                error_rate: w.error_rate,
                latency: w.latency,
                backpressure: w.backpressure,
            })
            .unwrap_or_default()
    }

    pub fn get_hysteresis_margin(&self) -> f64 {
        self.hysteresis_margin.unwrap_or(DEFAULT_HYSTERESIS_MARGIN)
    }

    pub fn get_tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.unwrap_or(DEFAULT_TICK_INTERVAL_SECS))
    }

    pub fn settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            weights: self.get_weights(),
            hysteresis_margin: self.get_hysteresis_margin(),
            tick_interval: self.get_tick_interval(),
        }
    }
}

/// Cross-class dispatch order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    #[default]
    Strict,
    Weighted,
}

/// Per-class weights used by weighted ordering.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClassWeightsConfig {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Admission queue settings shared by every stage.
///
/// # Example
/// ```yaml
/// admission:
///   aging_threshold_ms: 2000
///   blocking_timeout_ms: 250
///   buffer_seconds: 2.0
///   ordering: weighted
///   class_weights: { high: 8, medium: 3, low: 1 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmissionConfig {
    pub aging_threshold_ms: Option<u64>,
    pub blocking_timeout_ms: Option<u64>,
    pub buffer_seconds: Option<f64>,
    #[serde(default)]
    pub ordering: OrderingMode,
    pub class_weights: Option<ClassWeightsConfig>,
}

impl AdmissionConfig {
    pub fn get_class_weights(&self) -> [u32; 3] {
        self.class_weights
            .map(|w| [w.high, w.medium, w.low])
            .unwrap_or(DEFAULT_CLASS_WEIGHTS)
    }

    pub fn get_ordering(&self) -> ClassOrdering {
        match self.ordering {
            OrderingMode::Strict => ClassOrdering::Strict,
            OrderingMode::Weighted => ClassOrdering::Weighted {
                weights: self.get_class_weights(),
            },
        }
    }

    pub fn settings(&self) -> AdmissionSettings {
        AdmissionSettings {
            aging_threshold: Duration::from_millis(
                self.aging_threshold_ms.unwrap_or(DEFAULT_AGING_THRESHOLD_MS),
            ),
            blocking_timeout: Duration::from_millis(
                self.blocking_timeout_ms.unwrap_or(DEFAULT_BLOCKING_TIMEOUT_MS),
            ),
            buffer_seconds: self.buffer_seconds.unwrap_or(DEFAULT_BUFFER_SECONDS),
            ordering: self.get_ordering(),
        }
    }
}

/// Rope controller tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateControllerConfig {
    pub low_watermark: Option<f64>,
    pub high_watermark: Option<f64>,
    pub damping_factor: Option<f64>,
    pub growth_factor: Option<f64>,
    pub floor: Option<f64>,
    pub initial_rate: Option<f64>,
}

impl RateControllerConfig {
    pub fn settings(&self) -> RateSettings {
        RateSettings {
            low_watermark: self.low_watermark.unwrap_or(DEFAULT_LOW_WATERMARK),
            high_watermark: self.high_watermark.unwrap_or(DEFAULT_HIGH_WATERMARK),
            damping_factor: self.damping_factor.unwrap_or(DEFAULT_DAMPING_FACTOR),
            growth_factor: self.growth_factor.unwrap_or(DEFAULT_GROWTH_FACTOR),
            floor: self.floor.unwrap_or(DEFAULT_RATE_FLOOR),
            initial_rate: self.initial_rate,
        }
    }
}

/// Guarded dependencies and their circuit settings.
///
/// # Example
/// ```yaml
/// circuits:
///   defaults:
///     failure_ratio_threshold: 0.5
///     window_size: 20
///   dependencies:
///     - id: payment-gateway
///       cool_down_ms: 15000
///     - id: warehouse
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CircuitsConfig {
    #[serde(default)]
    pub defaults: CircuitConfig,
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
}

/// Circuit settings; unset fields inherit from `circuits.defaults`, then
/// from the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CircuitConfig {
    pub failure_ratio_threshold: Option<f64>,
    pub window_size: Option<usize>,
    pub minimum_calls: Option<usize>,
    pub cool_down_ms: Option<u64>,
    pub half_open_trials: Option<u32>,
    pub call_timeout_ms: Option<u64>,
}

impl CircuitConfig {
    pub fn settings(&self, defaults: &CircuitConfig) -> CircuitSettings {
        let window_size = self
            .window_size
            .or(defaults.window_size)
            .unwrap_or(DEFAULT_CIRCUIT_WINDOW_SIZE);
        CircuitSettings {
            failure_ratio_threshold: self
                .failure_ratio_threshold
                .or(defaults.failure_ratio_threshold)
                .unwrap_or(DEFAULT_FAILURE_RATIO_THRESHOLD),
            window_size,
            minimum_calls: self
                .minimum_calls
                .or(defaults.minimum_calls)
                .unwrap_or(window_size),
            cool_down: Duration::from_millis(
                self.cool_down_ms
                    .or(defaults.cool_down_ms)
                    .unwrap_or(DEFAULT_COOL_DOWN_SECS * 1000),
            ),
            half_open_trials: self
                .half_open_trials
                .or(defaults.half_open_trials)
                .unwrap_or(DEFAULT_HALF_OPEN_TRIALS),
            call_timeout: Duration::from_millis(
                self.call_timeout_ms
                    .or(defaults.call_timeout_ms)
                    .unwrap_or(DEFAULT_CALL_TIMEOUT_MS),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    pub id: String,
    #[serde(flatten)]
    pub overrides: CircuitConfig,
}

/// A workflow's static transition table.
///
/// # Example
/// ```yaml
/// name: order
/// states: [created, pending, paid, cancelled]
/// initial: created
/// terminal: [paid, cancelled]
/// abort_event: cancel
/// transitions:
///   - { from: created, event: confirm, to: pending, compensate_with: release }
///   - { from: pending, event: pay_ok, to: paid, dependency: payment-gateway }
///   - { from: pending, event: release, to: created }
///   - { from: created, event: cancel, to: cancelled }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub states: Vec<String>,
    pub initial: String,
    pub terminal: Vec<String>,
    pub abort_event: Option<String>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub from: String,
    pub event: String,
    pub to: String,
    pub compensate_with: Option<String>,
    pub dependency: Option<String>,
}

/// Load a config from a YAML file, or TOML when the extension is `.toml`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Config::from_toml_str(&content),
        _ => Config::from_yaml_str(&content),
    }
}

/// Load a config and validate it, reporting every problem found.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
