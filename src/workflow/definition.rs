// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};

use crate::config::consts::DEFAULT_MAX_RETRIES;
use crate::config::WorkflowConfig;
use crate::errors::ValidationError;
use crate::types::{DependencyId, Event, State};

/// What applying an event in a given state does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    pub to: State,
    /// Event that undoes this step from `to`.
    pub compensate_with: Option<Event>,
    /// Dependency called as the step's side effect.
    pub dependency: Option<DependencyId>,
}

/// A validated, static transition table for one workflow.
///
/// Built with [`WorkflowDefinition::from_config`], which reports every
/// structural problem at once. A definition that exists is known to be
/// well formed: every compensation leads back where its step started (or to a
/// terminal state), and every point where a rollback can stop has an abort
/// path to a terminal state.
///
/// # Example
/// ```
/// use the_flowgate::config::WorkflowConfig;
/// use the_flowgate::workflow::WorkflowDefinition;
///
/// let config: WorkflowConfig = serde_yaml::from_str(r#"
/// name: order
/// states: [created, pending, paid, cancelled]
/// initial: created
/// terminal: [paid, cancelled]
/// abort_event: cancel
/// transitions:
///   - { from: created, event: confirm, to: pending, compensate_with: release }
///   - { from: pending, event: pay_ok, to: paid }
///   - { from: pending, event: release, to: created }
///   - { from: created, event: cancel, to: cancelled }
///   - { from: pending, event: cancel, to: cancelled }
/// "#).unwrap();
///
/// let order = WorkflowDefinition::from_config(&config).unwrap();
/// assert_eq!(order.rule("created", "confirm").unwrap().to.as_str(), "pending");
/// assert!(order.rule("pending", "confirm").is_none());
/// assert!(order.is_terminal("paid"));
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    states: Vec<State>,
    initial: State,
    terminal: HashSet<State>,
    abort_event: Option<Event>,
    max_retries: u32,
    table: HashMap<State, HashMap<Event, TransitionRule>>,
}

impl WorkflowDefinition {
    /// Build and check a definition from its configuration.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let workflow = config.name.clone();

        let declared: HashSet<&str> = config.states.iter().map(String::as_str).collect();
        let check_state = |state: &str, errors: &mut Vec<ValidationError>| {
            if !declared.contains(state) {
                errors.push(ValidationError::UnknownState {
                    workflow: workflow.clone(),
                    state: state.to_string(),
                });
            }
        };

        if config.states.is_empty() {
            errors.push(ValidationError::UnknownState {
                workflow: workflow.clone(),
                state: config.initial.clone(),
            });
        }
        check_state(&config.initial, &mut errors);
        for state in &config.terminal {
            check_state(state, &mut errors);
        }
        if config.terminal.is_empty() {
            errors.push(ValidationError::NoTerminalStates {
                workflow: workflow.clone(),
            });
        }

        let terminal: HashSet<State> = config.terminal.iter().map(State::new).collect();
        let mut table: HashMap<State, HashMap<Event, TransitionRule>> = HashMap::new();

        for transition in &config.transitions {
            check_state(&transition.from, &mut errors);
            check_state(&transition.to, &mut errors);

            if terminal.contains(transition.from.as_str()) {
                errors.push(ValidationError::TransitionFromTerminal {
                    workflow: workflow.clone(),
                    state: transition.from.clone(),
                    event: transition.event.clone(),
                });
                continue;
            }

            let events = table.entry(State::new(&transition.from)).or_default();
            if events.contains_key(transition.event.as_str()) {
                errors.push(ValidationError::DuplicateTransition {
                    workflow: workflow.clone(),
                    state: transition.from.clone(),
                    event: transition.event.clone(),
                });
                continue;
            }
            events.insert(
                Event::new(&transition.event),
                TransitionRule {
                    to: State::new(&transition.to),
                    compensate_with: transition.compensate_with.as_deref().map(Event::new),
                    dependency: transition.dependency.as_deref().map(DependencyId::new),
                },
            );
        }

        let definition = Self {
            name: config.name.clone(),
            states: config.states.iter().map(State::new).collect(),
            initial: State::new(&config.initial),
            terminal,
            abort_event: config.abort_event.as_deref().map(Event::new),
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            table,
        };

        if errors.is_empty() {
            errors.extend(definition.check_compensations());
            errors.extend(definition.check_abort_paths());
        }

        if errors.is_empty() {
            Ok(definition)
        } else {
            Err(errors)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn initial(&self) -> &State {
        &self.initial
    }

    pub fn abort_event(&self) -> Option<&Event> {
        self.abort_event.as_ref()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminal.contains(state)
    }

    /// The rule for `event` in `state`, if the table has one.
    pub fn rule(&self, state: &str, event: &str) -> Option<&TransitionRule> {
        self.table.get(state)?.get(event)
    }

    /// Dependencies referenced anywhere in the table.
    pub fn dependencies(&self) -> impl Iterator<Item = &DependencyId> {
        self.table
            .values()
            .flat_map(|events| events.values())
            .filter_map(|rule| rule.dependency.as_ref())
    }

    fn transitions(&self) -> impl Iterator<Item = (&State, &Event, &TransitionRule)> {
        self.table
            .iter()
            .flat_map(|(from, events)| events.iter().map(move |(event, rule)| (from, event, rule)))
    }

    /// Every compensation must exist from the step's target and unwind it.
    fn check_compensations(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (from, event, rule) in self.transitions() {
            let Some(undo) = &rule.compensate_with else {
                continue;
            };
            match self.rule(rule.to.as_str(), undo.as_str()) {
                None => errors.push(ValidationError::CompensationNotInTable {
                    workflow: self.name.clone(),
                    state: rule.to.to_string(),
                    event: undo.to_string(),
                }),
                Some(back) if back.to != *from && !self.is_terminal(back.to.as_str()) => {
                    errors.push(ValidationError::CompensationDoesNotUnwind {
                        workflow: self.name.clone(),
                        event: format!("{} (undoing '{}')", undo, event),
                        expected: from.to_string(),
                        actual: back.to.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        errors
    }

    /// States where a rollback can stop need an abort path to a terminal state.
    fn check_abort_paths(&self) -> Vec<ValidationError> {
        let undo_steps: HashSet<(&str, &str)> = self
            .transitions()
            .filter_map(|(_, _, rule)| {
                let undo = rule.compensate_with.as_ref()?;
                Some((rule.to.as_str(), undo.as_str()))
            })
            .collect();

        let mut stops: Vec<&State> = vec![&self.initial];
        for (from, event, rule) in self.transitions() {
            if rule.compensate_with.is_some() || undo_steps.contains(&(from.as_str(), event.as_str())) {
                continue;
            }
            if !stops.contains(&&rule.to) {
                stops.push(&rule.to);
            }
        }

        let mut errors = Vec::new();
        for state in stops {
            if self.is_terminal(state.as_str()) {
                continue;
            }
            let aborts = self.abort_event.as_ref().and_then(|abort| {
                self.rule(state.as_str(), abort.as_str())
                    .filter(|rule| self.is_terminal(rule.to.as_str()))
            });
            if aborts.is_none() {
                errors.push(ValidationError::MissingAbortTransition {
                    workflow: self.name.clone(),
                    state: state.to_string(),
                });
            }
        }
        errors.sort_by_key(|e| e.to_string());
        errors
    }
}
