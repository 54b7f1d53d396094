use super::Action;
use crate::collections::{BoundedLog, Overflow};
use log::warn;

const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of actions waiting for dispatch.
///
/// A full queue still accepts new actions by dropping the oldest one.
pub struct ActionQueue {
    actions: BoundedLog<Action>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: BoundedLog::new(capacity, Overflow::DropOldest),
        }
    }

    pub fn enqueue(&mut self, action: Action) {
        if self.actions.len() >= self.actions.capacity() {
            if let Some(oldest) = self.actions.front() {
                warn!("Action queue full, dropping oldest action {}", oldest);
            }
        }
        self.actions.push(action);
    }

    pub fn dequeue(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn peek(&self) -> Option<&Action> {
        self.actions.front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.actions.capacity()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn actions_by_player(&self, player_id: &str) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|action| action.player_id() == player_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;

    #[test]
    fn test_overflow_keeps_most_recent_in_order() {
        let capacity = 5;
        let mut queue = ActionQueue::with_capacity(capacity);
        let actions: Vec<Action> = (0..=capacity)
            .map(|i| Action::with_identity(format!("a{i}"), "p1", i as f64, ActionKind::Stop))
            .collect();

        for action in actions {
            queue.enqueue(action);
        }
        assert_eq!(queue.len(), capacity);

        let drained: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|action| action.action_id().to_string())
            .collect();
        assert_eq!(drained, vec!["a1", "a2", "a3", "a4", "a5"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_and_player_filter() {
        let mut queue = ActionQueue::new();
        assert!(queue.peek().is_none());
        assert_eq!(queue.capacity(), 100);

        queue.enqueue(Action::with_identity("a", "p1", 0.0, ActionKind::Stop));
        queue.enqueue(Action::with_identity("b", "p2", 0.0, ActionKind::Stop));
        queue.enqueue(Action::with_identity("c", "p1", 0.0, ActionKind::Stop));

        assert_eq!(queue.peek().map(|a| a.action_id()), Some("a"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.actions_by_player("p1").len(), 2);

        queue.clear();
        assert!(queue.is_empty());
    }
}
