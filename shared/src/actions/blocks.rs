use super::ActionExecutionResult;
use crate::world::{PlayerState, World, AIR};
use crate::{distance, tile_center, CHUNK_SIZE, MELEE_REACH};
use log::debug;
use serde_json::json;

const CHEST: u32 = 3;
const FURNACE: u32 = 4;
const DOOR: u32 = 5;
const FARMABLE_BLOCKS: [u32; 2] = [1, 2];
const WHEAT_CROP: u32 = 10;

/// Inventory item type that places block `block_id`
pub(crate) fn block_item(block_id: u32) -> String {
    format!("block_{block_id}")
}

fn crop_block(seed_type: &str) -> u32 {
    match seed_type {
        "carrot_seed" => 11,
        "potato_seed" => 12,
        _ => WHEAT_CROP,
    }
}

/// Fails with `Invalid` when the tile centre is out of the player's reach
fn check_reach(x: i32, y: i32, player: &PlayerState, what: &str) -> Option<ActionExecutionResult> {
    let (cx, cy) = tile_center(x, y);
    let dist = distance(player.x, player.y, cx, cy);
    if dist > MELEE_REACH {
        return Some(ActionExecutionResult::invalid(format!(
            "{what} too far away: {dist:.1} > {MELEE_REACH}"
        )));
    }
    None
}

pub(super) fn validate_place(
    x: i32,
    y: i32,
    block_id: u32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if let Some(rejection) = check_reach(x, y, player, "Block") {
        return rejection;
    }

    let existing = world.get_block(x, y);
    if existing != AIR {
        return ActionExecutionResult::invalid(format!(
            "Position already occupied by block {existing}"
        ));
    }

    if block_id == AIR {
        return ActionExecutionResult::invalid(format!("Invalid block ID: {block_id}"));
    }

    if player.count_item(&block_item(block_id)) == 0 {
        return ActionExecutionResult::insufficient_resources(format!(
            "Player doesn't have block type {block_id}"
        ));
    }

    ActionExecutionResult::success("Block placement validated")
}

pub(super) fn execute_place(
    x: i32,
    y: i32,
    block_id: u32,
    player_id: &str,
    world: &mut dyn World,
    player: &mut PlayerState,
) -> ActionExecutionResult {
    let item = block_item(block_id);
    if player.remove_item(&item, 1) == 0 {
        return ActionExecutionResult::failed("Failed to consume block from inventory");
    }

    if !world.set_block(x, y, block_id, player_id) {
        player.add_item(&item, 1);
        return ActionExecutionResult::failed("Failed to place block in world");
    }

    debug!("Player {} placed block {} at ({}, {})", player_id, block_id, x, y);

    ActionExecutionResult::success("Block placed successfully").with_data(json!({
        "position": [x, y],
        "block_id": block_id,
        "chunk_x": x.div_euclid(CHUNK_SIZE),
        "chunk_y": y.div_euclid(CHUNK_SIZE),
    }))
}

pub(super) fn validate_break(
    x: i32,
    y: i32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if let Some(rejection) = check_reach(x, y, player, "Block") {
        return rejection;
    }
    if world.get_block(x, y) == AIR {
        return ActionExecutionResult::invalid("No block to break at this position");
    }
    ActionExecutionResult::success("Block breaking validated")
}

pub(super) fn execute_break(
    x: i32,
    y: i32,
    player_id: &str,
    world: &mut dyn World,
) -> ActionExecutionResult {
    let broken = world.get_block(x, y);
    if broken == AIR {
        return ActionExecutionResult::failed("No block to break");
    }
    if !world.set_block(x, y, AIR, player_id) {
        return ActionExecutionResult::failed("Failed to break block in world");
    }

    let (cx, cy) = tile_center(x, y);
    let item = block_item(broken);
    let item_id = world.spawn_floating_item(&item, 1, cx, cy);

    debug!("Player {} broke block {} at ({}, {})", player_id, broken, x, y);

    ActionExecutionResult::success("Block broken successfully").with_data(json!({
        "position": [x, y],
        "broken_block_id": broken,
        "item_spawned": item,
        "item_id": item_id,
        "chunk_x": x.div_euclid(CHUNK_SIZE),
        "chunk_y": y.div_euclid(CHUNK_SIZE),
    }))
}

pub(super) fn validate_interact(
    x: i32,
    y: i32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if let Some(rejection) = check_reach(x, y, player, "Interaction target") {
        return rejection;
    }
    let block_id = world.get_block(x, y);
    if !matches!(block_id, CHEST | FURNACE | DOOR) {
        return ActionExecutionResult::invalid(format!("Block {block_id} is not interactive"));
    }
    ActionExecutionResult::success("Interaction validated")
}

pub(super) fn execute_interact(
    x: i32,
    y: i32,
    interaction_type: &str,
    world: &mut dyn World,
) -> ActionExecutionResult {
    let block_id = world.get_block(x, y);
    let (effect, message) = match block_id {
        CHEST => ("open_chest", "Chest opened".to_string()),
        FURNACE => ("open_furnace", "Furnace opened".to_string()),
        DOOR => ("toggle_door", "Door toggled".to_string()),
        other => ("generic_interact", format!("Interacted with block {other}")),
    };

    ActionExecutionResult::success(message).with_data(json!({
        "position": [x, y],
        "block_id": block_id,
        "interaction_type": interaction_type,
        "action": effect,
    }))
}

pub(super) fn validate_plant(
    x: i32,
    y: i32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if let Some(rejection) = check_reach(x, y, player, "Planting location") {
        return rejection;
    }
    let block_id = world.get_block(x, y);
    if !FARMABLE_BLOCKS.contains(&block_id) {
        return ActionExecutionResult::invalid(format!("Cannot plant on block type {block_id}"));
    }
    ActionExecutionResult::success("Seed planting validated")
}

pub(super) fn execute_plant(
    x: i32,
    y: i32,
    seed_type: &str,
    player_id: &str,
    world: &mut dyn World,
    player: &mut PlayerState,
) -> ActionExecutionResult {
    if player.remove_item(seed_type, 1) == 0 {
        return ActionExecutionResult::insufficient_resources(format!(
            "No {seed_type} in inventory"
        ));
    }

    let crop = crop_block(seed_type);
    if !world.set_block(x, y, crop, player_id) {
        player.add_item(seed_type, 1);
        return ActionExecutionResult::failed("Failed to plant seed in world");
    }

    debug!("Player {} planted {} at ({}, {})", player_id, seed_type, x, y);

    ActionExecutionResult::success("Seed planted successfully").with_data(json!({
        "position": [x, y],
        "seed_type": seed_type,
        "crop_block_id": crop,
    }))
}
