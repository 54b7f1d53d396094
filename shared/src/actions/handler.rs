use super::{Action, ActionExecutionResult, ActionValidator, DEFAULT_COOLDOWN};
use crate::collections::{BoundedLog, Overflow};
use crate::world::{PlayerState, World};
use log::{debug, error};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

const HISTORY_CAPACITY: usize = 1000;

/// Counters reported by [`ActionHandler::stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerStats {
    pub actions_processed: u64,
    pub actions_successful: u64,
    pub actions_failed: u64,
    /// Percentage of processed actions that succeeded
    pub success_rate: f64,
    pub history_size: usize,
}

/// Single entry point that validates, executes and records actions.
///
/// The same pipeline runs on the authoritative server and on a client doing
/// speculative execution. Any action flagged `requires_validation` is always
/// re-validated, whoever sent it.
pub struct ActionHandler {
    validator: ActionValidator,
    history: BoundedLog<Action>,
    actions_processed: u64,
    actions_successful: u64,
    actions_failed: u64,
}

impl Default for ActionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler {
    pub fn new() -> Self {
        Self::with_validator(ActionValidator::new())
    }

    pub fn with_validator(validator: ActionValidator) -> Self {
        Self {
            validator,
            history: BoundedLog::new(HISTORY_CAPACITY, Overflow::Halve),
            actions_processed: 0,
            actions_successful: 0,
            actions_failed: 0,
        }
    }

    pub fn validator(&self) -> &ActionValidator {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut ActionValidator {
        &mut self.validator
    }

    /// Validates and executes `action` against the world and player.
    ///
    /// Never panics and never returns an error: every failure is reported as
    /// an [`ActionExecutionResult`]. On success the action is marked executed,
    /// its cooldown starts and it is appended to the history.
    pub fn process_action(
        &mut self,
        action: &mut Action,
        world: &mut dyn World,
        player: &mut PlayerState,
    ) -> ActionExecutionResult {
        self.actions_processed += 1;

        if action.executed() && !action.allows_multiple_execution() {
            self.actions_failed += 1;
            return ActionExecutionResult::invalid("Action has already been executed");
        }

        if action.requires_validation {
            let validation = self.validator.validate_action(action, &*world, player);
            if !validation.is_success() {
                self.actions_failed += 1;
                debug!("Action validation failed: {} - {}", action, validation.message);
                return validation;
            }
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| action.execute(world, player)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                self.actions_failed += 1;
                error!("Error processing action {}: {}", action, e);
                return ActionExecutionResult::failed(format!("Execution error: {e}"));
            }
            Err(_) => {
                self.actions_failed += 1;
                error!("Action {} panicked during execution", action);
                return ActionExecutionResult::failed("Execution error: action panicked");
            }
        };

        action.record_execution(result.clone());

        if result.is_success() {
            self.actions_successful += 1;
            if action.cooldown_seconds > 0.0 {
                let duration =
                    Duration::try_from_secs_f64(action.cooldown_seconds).unwrap_or(DEFAULT_COOLDOWN);
                self.validator
                    .set_cooldown(action.player_id(), action.action_type(), duration);
            }
            debug!("Action executed successfully: {}", action);
        } else {
            self.actions_failed += 1;
            debug!("Action execution failed: {} - {}", action, result.message);
        }

        self.history.push(action.clone());
        result
    }

    pub fn stats(&self) -> HandlerStats {
        let success_rate = if self.actions_processed > 0 {
            self.actions_successful as f64 / self.actions_processed as f64 * 100.0
        } else {
            0.0
        };

        HandlerStats {
            actions_processed: self.actions_processed,
            actions_successful: self.actions_successful,
            actions_failed: self.actions_failed,
            success_rate,
            history_size: self.history.len(),
        }
    }

    /// Up to `limit` of the most recently executed actions, oldest first
    pub fn recent_actions(&self, limit: usize) -> Vec<&Action> {
        self.history.recent(limit).collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
