// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::TransitionError;
use crate::types::{Event, InstanceId, State};
use crate::workflow::WorkflowDefinition;

/// How a history entry came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Forward,
    Compensation,
    Abort,
}

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub event: Event,
    pub to: State,
    pub kind: TransitionKind,
    pub recorded_at: SystemTime,
}

/// The next rollback step for an instance that is compensating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStep {
    /// Undo the most recent un-compensated forward step.
    Compensate(Event),
    /// Nothing left to undo; leave through the abort transition.
    Abort(Event),
}

impl RollbackStep {
    pub fn event(&self) -> &Event {
        match self {
            RollbackStep::Compensate(event) | RollbackStep::Abort(event) => event,
        }
    }

    pub fn kind(&self) -> TransitionKind {
        match self {
            RollbackStep::Compensate(_) => TransitionKind::Compensation,
            RollbackStep::Abort(_) => TransitionKind::Abort,
        }
    }
}

/// A single running workflow: its current state and the ordered history of
/// every transition that got it there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: InstanceId,
    pub workflow: String,
    pub state: State,
    pub history: Vec<TransitionRecord>,
    /// Set while a rollback is under way; events are refused until it ends.
    pub compensating: bool,
    /// The failure that started the rollback, if any.
    pub failure: Option<String>,
}

impl WorkflowInstance {
    pub fn new(id: InstanceId, definition: &WorkflowDefinition) -> Self {
        Self {
            id,
            workflow: definition.name().to_string(),
            state: definition.initial().clone(),
            history: Vec::new(),
            compensating: false,
            failure: None,
        }
    }

    pub fn record(&mut self, event: Event, to: State, kind: TransitionKind) {
        let from = std::mem::replace(&mut self.state, to.clone());
        self.history.push(TransitionRecord {
            from,
            event,
            to,
            kind,
            recorded_at: SystemTime::now(),
        });
    }

    /// Forward steps not yet undone, most recent last.
    pub fn uncompensated(&self) -> Vec<&TransitionRecord> {
        let mut stack = Vec::new();
        for record in &self.history {
            match record.kind {
                TransitionKind::Forward => stack.push(record),
                TransitionKind::Compensation => {
                    stack.pop();
                }
                TransitionKind::Abort => stack.clear(),
            }
        }
        stack
    }

    /// What a rollback should do next from the current state.
    ///
    /// Recomputed from history each time, so a rollback interrupted by a crash
    /// resumes at the correct step rather than repeating finished ones.
    /// `None` means the instance is terminal (or the table offers no way out).
    pub fn next_rollback_step(&self, definition: &WorkflowDefinition) -> Option<RollbackStep> {
        if definition.is_terminal(self.state.as_str()) {
            return None;
        }

        if let Some(top) = self.uncompensated().last() {
            let undo = definition
                .rule(top.from.as_str(), top.event.as_str())
                .and_then(|rule| rule.compensate_with.as_ref());
            if let Some(undo) = undo {
                if top.to == self.state && definition.rule(self.state.as_str(), undo.as_str()).is_some() {
                    return Some(RollbackStep::Compensate(undo.clone()));
                }
            }
        }

        definition
            .abort_event()
            .filter(|abort| definition.rule(self.state.as_str(), abort.as_str()).is_some())
            .map(|abort| RollbackStep::Abort(abort.clone()))
    }

    /// Rebuild an instance by replaying a recorded history against the table.
    ///
    /// Every record must start where the previous one ended and match the
    /// table's target for its event.
    pub fn replay(
        definition: &WorkflowDefinition,
        id: InstanceId,
        history: &[TransitionRecord],
    ) -> Result<Self, TransitionError> {
        let mut instance = Self::new(id, definition);
        for record in history {
            let valid = record.from == instance.state
                && definition
                    .rule(record.from.as_str(), record.event.as_str())
                    .is_some_and(|rule| rule.to == record.to);
            if !valid {
                return Err(TransitionError::InvalidTransition {
                    instance: instance.id.clone(),
                    state: instance.state.clone(),
                    event: record.event.clone(),
                });
            }
            instance.state = record.to.clone();
            instance.history.push(record.clone());
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;

    fn shipping() -> WorkflowDefinition {
        let config: WorkflowConfig = serde_yaml::from_str(
            r#"
name: shipping
states: [created, reserved, charged, shipped, cancelled]
initial: created
terminal: [shipped, cancelled]
abort_event: cancel
transitions:
  - { from: created, event: reserve, to: reserved, compensate_with: unreserve }
  - { from: reserved, event: charge, to: charged, compensate_with: refund }
  - { from: charged, event: ship, to: shipped }
  - { from: reserved, event: unreserve, to: created }
  - { from: charged, event: refund, to: reserved }
  - { from: created, event: cancel, to: cancelled }
"#,
        )
        .unwrap();
        WorkflowDefinition::from_config(&config).unwrap()
    }

    #[test]
    fn test_rollback_unwinds_most_recent_first() {
        let definition = shipping();
        let mut instance = WorkflowInstance::new(InstanceId::new("o-1"), &definition);
        instance.record(Event::new("reserve"), State::new("reserved"), TransitionKind::Forward);
        instance.record(Event::new("charge"), State::new("charged"), TransitionKind::Forward);

        assert_eq!(
            instance.next_rollback_step(&definition),
            Some(RollbackStep::Compensate(Event::new("refund")))
        );
        instance.record(Event::new("refund"), State::new("reserved"), TransitionKind::Compensation);

        assert_eq!(
            instance.next_rollback_step(&definition),
            Some(RollbackStep::Compensate(Event::new("unreserve")))
        );
        instance.record(Event::new("unreserve"), State::new("created"), TransitionKind::Compensation);

        assert_eq!(
            instance.next_rollback_step(&definition),
            Some(RollbackStep::Abort(Event::new("cancel")))
        );
        instance.record(Event::new("cancel"), State::new("cancelled"), TransitionKind::Abort);

        assert_eq!(instance.next_rollback_step(&definition), None);
        assert!(instance.uncompensated().is_empty());
    }

    #[test]
    fn test_replay_rebuilds_state() {
        let definition = shipping();
        let mut original = WorkflowInstance::new(InstanceId::new("o-2"), &definition);
        original.record(Event::new("reserve"), State::new("reserved"), TransitionKind::Forward);
        original.record(Event::new("charge"), State::new("charged"), TransitionKind::Forward);

        let replayed =
            WorkflowInstance::replay(&definition, InstanceId::new("o-2"), &original.history).unwrap();
        assert_eq!(replayed.state.as_str(), "charged");
        assert_eq!(replayed.history, original.history);
    }

    #[test]
    fn test_replay_rejects_inconsistent_history() {
        let definition = shipping();
        let bogus = vec![TransitionRecord {
            from: State::new("created"),
            event: Event::new("charge"),
            to: State::new("charged"),
            kind: TransitionKind::Forward,
            recorded_at: SystemTime::now(),
        }];

        let result = WorkflowInstance::replay(&definition, InstanceId::new("o-3"), &bogus);
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition { ref event, .. }) if event.as_str() == "charge"
        ));
    }

    #[test]
    fn test_instance_serializes_round_trip() {
        let definition = shipping();
        let mut instance = WorkflowInstance::new(InstanceId::new("o-4"), &definition);
        instance.record(Event::new("reserve"), State::new("reserved"), TransitionKind::Forward);

        let json = serde_json::to_string(&instance).unwrap();
        assert!(json.contains("\"kind\":\"forward\""));
        let back: WorkflowInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instance);
    }
}
