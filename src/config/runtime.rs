// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::circuit::CircuitRegistry;
use crate::config::{validate_config, Config};
use crate::engine::{EngineSettings, FlowEngine};
use crate::errors::ConfigError;
use crate::traits::{Clock, Downstream, InstanceStore, SystemClock};
use crate::types::DependencyId;
use crate::workflow::{InMemoryStore, WorkflowCoordinator, WorkflowDefinition};

/// Engine builder - assembles a [`FlowEngine`] from configuration.
///
/// The `EngineBuilder` validates the configuration, compiles every workflow
/// table, registers one circuit per declared dependency, and wires the
/// coordinator, queues and controllers together. The clock, the instance
/// store and the downstream implementations are supplied by the caller;
/// without a store, instances live in memory only.
///
/// # Examples
///
/// ```
/// use the_flowgate::config::{Config, EngineBuilder};
///
/// let config = Config::from_yaml_str(r#"
/// stages:
///   - id: intake
///     max_throughput: 100
///     latency_target_ms: 50
///     queue_capacity: 20
/// "#).unwrap();
///
/// let engine = EngineBuilder::from_config(config).build().unwrap();
/// assert_eq!(engine.topology().len(), 1);
/// assert!(engine.current_constraint().is_none());
/// ```
pub struct EngineBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn InstanceStore>>,
    downstreams: Vec<(DependencyId, Arc<dyn Downstream>)>,
}

impl EngineBuilder {
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            store: None,
            downstreams: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn downstream(mut self, dependency: impl Into<DependencyId>, downstream: Arc<dyn Downstream>) -> Self {
        self.downstreams.push((dependency.into(), downstream));
        self
    }

    /// Control-loop settings with every configured override applied.
    pub fn settings(config: &Config) -> EngineSettings {
        EngineSettings {
            metrics: config.metrics.settings(),
            analyzer: config.analyzer.settings(),
            admission: config.admission.settings(),
            rate: config.rate_controller.settings(),
        }
    }

    /// Validate and assemble. Every validation problem is reported at once.
    pub fn build(self) -> Result<FlowEngine, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Invalid)?;

        let definitions = self
            .config
            .workflows
            .iter()
            .map(WorkflowDefinition::from_config)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::Invalid)?;

        let circuits = CircuitRegistry::new(self.config.circuit_settings(), Arc::clone(&self.clock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let coordinator = WorkflowCoordinator::new(definitions, store, circuits);
        for (dependency, downstream) in self.downstreams {
            coordinator.bind(dependency, downstream);
        }

        Ok(FlowEngine::new(
            Arc::new(self.config.topology()),
            Self::settings(&self.config),
            Arc::new(coordinator),
            self.clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use crate::traits::ManualClock;
    use std::time::Duration;

    const PIPELINE: &str = r#"
stages:
  - id: intake
    max_throughput: 100
    latency_target_ms: 50
    queue_capacity: 20
    downstream: [payment]
  - id: payment
    max_throughput: 40
    latency_target_ms: 200
    queue_capacity: 10
    workers: 2
    circuit: payment-gateway
analyzer:
  tick_interval_seconds: 5
rate_controller:
  damping_factor: 0.5
circuits:
  dependencies:
    - id: payment-gateway
      cool_down_ms: 1000
"#;

    #[test]
    fn test_build_applies_configured_settings() {
        let config = Config::from_yaml_str(PIPELINE).unwrap();
        let engine = EngineBuilder::from_config(config)
            .clock(Arc::new(ManualClock::new()))
            .build()
            .unwrap();

        assert_eq!(engine.settings().analyzer.tick_interval, Duration::from_secs(5));
        assert_eq!(engine.settings().rate.damping_factor, 0.5);
        assert_eq!(engine.queue_statuses().len(), 2);

        let snapshot = engine.circuit_snapshot("payment-gateway").unwrap();
        assert_eq!(snapshot.calls, 0);
        assert!(engine.circuit_snapshot("warehouse").is_err());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = Config::from_yaml_str(
            r#"
stages:
  - id: intake
    max_throughput: 0
    latency_target_ms: 50
    queue_capacity: 20
    downstream: [missing]
"#,
        )
        .unwrap();

        match EngineBuilder::from_config(config).build() {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.len() >= 2);
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::NonPositiveValue { .. })));
            }
            Err(other) => panic!("expected validation failure, got {}", other),
            Ok(_) => panic!("expected validation failure"),
        }
    }
}
