//! Authoritative game state: the world, every player's state and the action
//! pipeline that mutates them

use log::{debug, info};
use shared::actions::{HandlerStats, RegistryStats};
use shared::{
    Action, ActionExecutionResult, ActionHandler, ActionRegistry, MemoryWorld, PlayerState,
};
use std::collections::HashMap;

/// Items every new player starts with
pub const STARTER_ITEMS: [(&str, u32); 5] = [
    ("wood", 5),
    ("stick", 3),
    ("block_1", 16),
    ("block_7", 8),
    ("wheat_seed", 4),
];

pub struct GameState {
    pub tick: u64,
    world: MemoryWorld,
    players: HashMap<String, PlayerState>,
    handler: ActionHandler,
    registry: ActionRegistry,
    spawn_point: (f32, f32),
}

impl GameState {
    pub fn new(world_size: u32, spawn_point: (f32, f32)) -> Self {
        Self {
            tick: 0,
            world: MemoryWorld::with_size(world_size),
            players: HashMap::new(),
            handler: ActionHandler::new(),
            registry: ActionRegistry::new(),
            spawn_point,
        }
    }

    pub fn add_player(&mut self, player_id: &str) {
        let (spawn_x, spawn_y) = self.spawn_point;
        let mut player = PlayerState::new(player_id, spawn_x, spawn_y);
        for (item, quantity) in STARTER_ITEMS {
            player.add_item(item, quantity);
        }

        info!("Added player {} at ({}, {})", player_id, player.x, player.y);
        self.players.insert(player_id.to_string(), player);
    }

    /// Removes a player and cancels whatever it still had in flight
    pub fn remove_player(&mut self, player_id: &str) -> Option<PlayerState> {
        let cancelled = self.registry.cancel_player_actions(player_id);
        self.handler.validator_mut().clear_player_cooldowns(player_id);
        if cancelled > 0 {
            debug!("Cancelled {} pending actions of {}", cancelled, player_id);
        }

        let player = self.players.remove(player_id)?;
        info!("Removed player {}", player_id);
        Some(player)
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut PlayerState> {
        self.players.get_mut(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn world(&self) -> &MemoryWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut MemoryWorld {
        &mut self.world
    }

    /// Runs `action` through the authoritative pipeline on behalf of its
    /// player and records the outcome in the registry
    pub fn apply_action(&mut self, mut action: Action) -> ActionExecutionResult {
        let action_id = action.action_id().to_string();
        self.registry.register(action.clone());

        let result = match self.players.get_mut(action.player_id()) {
            Some(player) => self
                .handler
                .process_action(&mut action, &mut self.world, player),
            None => ActionExecutionResult::invalid("Unknown player"),
        };

        self.registry.complete(&action_id, result.clone());
        result
    }

    pub fn action_result(&self, action_id: &str) -> Option<&ActionExecutionResult> {
        self.registry.get_action_result(action_id)
    }

    pub fn handler_stats(&self) -> HandlerStats {
        self.handler.stats()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{ActionKind, ActionResult, World};

    fn game_with_player() -> GameState {
        let mut game = GameState::new(shared::DEFAULT_WORLD_SIZE, shared::tile_center(0, 0));
        game.add_player("player_1");
        game
    }

    #[test]
    fn test_new_player_has_starter_items() {
        let game = game_with_player();
        let player = game.player("player_1").unwrap();

        let (spawn_x, spawn_y) = shared::tile_center(0, 0);
        assert_approx_eq!(player.x, spawn_x);
        assert_approx_eq!(player.y, spawn_y);
        assert_eq!(player.count_item("wood"), 5);
        assert_eq!(player.count_item("stick"), 3);
        assert_eq!(game.player_count(), 1);
    }

    #[test]
    fn test_craft_debits_materials() {
        let mut game = game_with_player();
        let craft = Action::new(
            "player_1",
            ActionKind::CraftItem {
                recipe_id: "wooden_pickaxe".to_string(),
                quantity: 1,
            },
        );
        let id = craft.action_id().to_string();

        let result = game.apply_action(craft);
        assert_eq!(result.result, ActionResult::Success);

        let player = game.player("player_1").unwrap();
        assert_eq!(player.count_item("wood"), 2);
        assert_eq!(player.count_item("stick"), 1);
        assert_eq!(player.count_item("wooden_pickaxe"), 1);

        assert!(game.action_result(&id).unwrap().is_success());
        assert_eq!(game.registry_stats().completed_actions, 1);
        assert_eq!(game.registry_stats().active_actions, 0);
    }

    #[test]
    fn test_out_of_reach_place_changes_nothing() {
        let mut game = game_with_player();
        let (cx, cy) = shared::tile_center(3, 3);
        game.player_mut("player_1").unwrap().set_position(cx + 500.0, cy);

        let result = game.apply_action(Action::new(
            "player_1",
            ActionKind::PlaceBlock {
                x: 3,
                y: 3,
                block_id: 7,
            },
        ));

        assert_eq!(result.result, ActionResult::Invalid);
        assert_eq!(game.world().get_block(3, 3), 0);
        assert_eq!(game.player("player_1").unwrap().count_item("block_7"), 8);
        assert_eq!(game.registry_stats().failed_actions, 1);
    }

    #[test]
    fn test_unknown_player_is_invalid() {
        let mut game = game_with_player();
        let result = game.apply_action(Action::new("ghost", ActionKind::Stop));
        assert_eq!(result.result, ActionResult::Invalid);
        assert_eq!(game.handler_stats().actions_processed, 0);
    }

    #[test]
    fn test_remove_player() {
        let mut game = game_with_player();
        assert!(game.remove_player("player_1").is_some());
        assert!(game.remove_player("player_1").is_none());
        assert!(game.player("player_1").is_none());
    }
}
