use super::{Action, ActionExecutionResult, ActionType};
use crate::world::{PlayerState, World};
use log::error;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Cooldown applied when an action does not declare its own duration
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Energy pool reported for every player until energy is tracked
const ENERGY_POOL: u32 = 100;

/// Externally registered veto for one action type. `Ok(false)` rejects the
/// action as invalid; `Err` reports a rule failure.
pub type ValidationRule =
    Box<dyn Fn(&Action, &dyn World, &PlayerState) -> Result<bool, String> + Send + Sync>;

/// Checks cooldowns, resource costs, the action's own rules and any custom
/// rules, stopping at the first failure
#[derive(Default)]
pub struct ActionValidator {
    rules: HashMap<ActionType, Vec<ValidationRule>>,
    cooldowns: HashMap<(String, ActionType), Instant>,
}

impl ActionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_validation_rule<F>(&mut self, action_type: ActionType, rule: F)
    where
        F: Fn(&Action, &dyn World, &PlayerState) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.rules
            .entry(action_type)
            .or_default()
            .push(Box::new(rule));
    }

    pub fn rule_count(&self, action_type: ActionType) -> usize {
        self.rules.get(&action_type).map_or(0, Vec::len)
    }

    pub fn validate_action(
        &self,
        action: &Action,
        world: &dyn World,
        player: &PlayerState,
    ) -> ActionExecutionResult {
        let action_type = action.action_type();

        let remaining = self.cooldown_remaining(action.player_id(), action_type);
        if !remaining.is_zero() {
            return ActionExecutionResult::cooldown(format!(
                "Action on cooldown for {:.1} more seconds",
                remaining.as_secs_f64()
            ));
        }

        if !Self::has_resources(action, player) {
            return ActionExecutionResult::insufficient_resources(
                "Insufficient resources for this action",
            );
        }

        let own = action.validate(world, player);
        if !own.is_success() {
            return own;
        }

        for rule in self.rules.get(&action_type).into_iter().flatten() {
            match catch_unwind(AssertUnwindSafe(|| rule(action, world, player))) {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    return ActionExecutionResult::invalid("Action failed custom validation rule");
                }
                Ok(Err(reason)) => {
                    error!("Validation rule error for {}: {}", action_type, reason);
                    return ActionExecutionResult::failed(format!("Validation error: {reason}"));
                }
                Err(_) => {
                    error!("Validation rule for {} panicked", action_type);
                    return ActionExecutionResult::failed("Validation error: rule panicked");
                }
            }
        }

        ActionExecutionResult::success("Validation passed")
    }

    fn has_resources(action: &Action, player: &PlayerState) -> bool {
        action
            .cost_resources
            .iter()
            .all(|(resource, required)| Self::player_resource(player, resource) >= *required)
    }

    fn player_resource(player: &PlayerState, resource: &str) -> u32 {
        match resource {
            "health" => player.health,
            "energy" => ENERGY_POOL,
            item => player.count_item(item),
        }
    }

    /// Starts a cooldown for `player_id` on `action_type`
    pub fn set_cooldown(&mut self, player_id: &str, action_type: ActionType, duration: Duration) {
        self.cooldowns
            .insert((player_id.to_string(), action_type), Instant::now() + duration);
    }

    /// Time left before `player_id` may use `action_type` again
    pub fn cooldown_remaining(&self, player_id: &str, action_type: ActionType) -> Duration {
        self.cooldowns
            .get(&(player_id.to_string(), action_type))
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_on_cooldown(&self, player_id: &str, action_type: ActionType) -> bool {
        !self.cooldown_remaining(player_id, action_type).is_zero()
    }

    /// Drops every cooldown held by a player, e.g. when they leave
    pub fn clear_player_cooldowns(&mut self, player_id: &str) {
        self.cooldowns.retain(|(owner, _), _| owner != player_id);
    }
}
