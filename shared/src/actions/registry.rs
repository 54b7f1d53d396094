use super::{Action, ActionExecutionResult};
use crate::collections::{BoundedLog, BoundedMap, Overflow};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

const MAX_HISTORY: usize = 1000;
const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active_actions: usize,
    pub completed_actions: usize,
    pub failed_actions: usize,
    pub total_history: usize,
}

/// Tracks actions from registration until they complete or are cancelled.
///
/// Owned by one session (a server or a client), never shared process-wide.
pub struct ActionRegistry {
    active: HashMap<String, Action>,
    completed: BoundedMap<String, ActionExecutionResult>,
    failed: BoundedMap<String, ActionExecutionResult>,
    history: BoundedLog<String>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
            completed: BoundedMap::new(MAX_RESULTS),
            failed: BoundedMap::new(MAX_RESULTS),
            history: BoundedLog::new(MAX_HISTORY, Overflow::DropOldest),
        }
    }

    /// Records `action` as active. Registering an id that is already active
    /// replaces the earlier record.
    pub fn register(&mut self, action: Action) {
        let action_id = action.action_id().to_string();
        self.history.push(action_id.clone());
        self.active.insert(action_id, action);
    }

    /// Moves an action out of the active set and files its result under
    /// completed or failed
    pub fn complete(&mut self, action_id: &str, result: ActionExecutionResult) {
        self.active.remove(action_id);

        let key = action_id.to_string();
        let evicted = if result.is_success() {
            self.failed.remove(&key);
            self.completed.insert(key, result)
        } else {
            self.completed.remove(&key);
            self.failed.insert(key, result)
        };

        if let Some((old_id, _)) = evicted {
            debug!("Evicted result for action {}", old_id);
        }
    }

    pub fn get_action(&self, action_id: &str) -> Option<&Action> {
        self.active.get(action_id)
    }

    pub fn active_actions_for_player(&self, player_id: &str) -> Vec<&Action> {
        self.active
            .values()
            .filter(|action| action.player_id() == player_id)
            .collect()
    }

    pub fn get_action_result(&self, action_id: &str) -> Option<&ActionExecutionResult> {
        let key = action_id.to_string();
        self.completed.get(&key).or_else(|| self.failed.get(&key))
    }

    /// Removes an active action without recording a result
    pub fn cancel_action(&mut self, action_id: &str) -> bool {
        self.active.remove(action_id).is_some()
    }

    /// Cancels every active action owned by `player_id`, returning how many
    /// were removed
    pub fn cancel_player_actions(&mut self, player_id: &str) -> usize {
        let before = self.active.len();
        self.active
            .retain(|_, action| action.player_id() != player_id);
        before - self.active.len()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_actions: self.active.len(),
            completed_actions: self.completed.len(),
            failed_actions: self.failed.len(),
            total_history: self.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionKind, ActionResult};

    fn stop(player: &str) -> Action {
        Action::new(player, ActionKind::Stop)
    }

    #[test]
    fn test_register_and_complete() {
        let mut registry = ActionRegistry::new();
        let action = stop("p1");
        let id = action.action_id().to_string();

        registry.register(action);
        assert!(registry.get_action(&id).is_some());
        assert_eq!(registry.stats().active_actions, 1);

        registry.complete(&id, ActionExecutionResult::success("ok"));
        assert!(registry.get_action(&id).is_none());
        assert_eq!(
            registry.get_action_result(&id).map(|r| r.result),
            Some(ActionResult::Success)
        );

        let stats = registry.stats();
        assert_eq!(stats.active_actions, 0);
        assert_eq!(stats.completed_actions, 1);
        assert_eq!(stats.total_history, 1);
    }

    #[test]
    fn test_failed_results_are_separate() {
        let mut registry = ActionRegistry::new();
        let action = stop("p1");
        let id = action.action_id().to_string();
        registry.register(action);

        registry.complete(&id, ActionExecutionResult::invalid("nope"));
        let stats = registry.stats();
        assert_eq!(stats.completed_actions, 0);
        assert_eq!(stats.failed_actions, 1);
        assert_eq!(
            registry.get_action_result(&id).map(|r| r.result),
            Some(ActionResult::Invalid)
        );
    }

    #[test]
    fn test_completed_results_are_bounded() {
        let mut registry = ActionRegistry::new();
        let mut first_id = String::new();

        for i in 0..(MAX_RESULTS + 5) {
            let action = stop("p1");
            let id = action.action_id().to_string();
            if i == 0 {
                first_id = id.clone();
            }
            registry.register(action);
            registry.complete(&id, ActionExecutionResult::success("ok"));
        }

        assert_eq!(registry.stats().completed_actions, MAX_RESULTS);
        assert!(registry.get_action_result(&first_id).is_none());
    }

    #[test]
    fn test_cancellation_produces_no_result() {
        let mut registry = ActionRegistry::new();
        let a = stop("p1");
        let b = stop("p1");
        let c = stop("p2");
        let a_id = a.action_id().to_string();

        registry.register(a);
        registry.register(b);
        registry.register(c);
        assert_eq!(registry.active_actions_for_player("p1").len(), 2);

        assert!(registry.cancel_action(&a_id));
        assert!(!registry.cancel_action(&a_id));
        assert!(registry.get_action_result(&a_id).is_none());

        assert_eq!(registry.cancel_player_actions("p1"), 1);
        assert_eq!(registry.stats().active_actions, 1);
        assert_eq!(registry.stats().failed_actions, 0);
    }
}
