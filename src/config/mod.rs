// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod runtime;
mod topology;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, AdmissionConfig, AnalyzerConfig, CircuitConfig,
    CircuitsConfig, ClassWeightsConfig, Config, DependencyConfig, MetricsConfig, OrderingMode,
    RateControllerConfig, StageConfig, TransitionConfig, WeightsConfig, WorkflowConfig,
};
pub use runtime::EngineBuilder;
pub use topology::{StageSpec, StageTopology};
pub use validation::validate_config;
