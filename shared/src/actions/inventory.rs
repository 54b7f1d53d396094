use super::{ActionError, ActionExecutionResult};
use crate::world::{EquipmentSlot, ItemStack, PlayerState, World};
use crate::{distance, MAX_STACK, PICKUP_RADIUS};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Inventory an item move can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryKind {
    Player,
    Chest,
    Furnace,
}

/// A crafting recipe: the materials consumed per craft and the stack produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub id: &'static str,
    pub materials: &'static [(&'static str, u32)],
    pub output: &'static str,
    pub output_quantity: u32,
}

const RECIPES: [Recipe; 3] = [
    Recipe {
        id: "wooden_pickaxe",
        materials: &[("wood", 3), ("stick", 2)],
        output: "wooden_pickaxe",
        output_quantity: 1,
    },
    Recipe {
        id: "stone_pickaxe",
        materials: &[("stone", 3), ("stick", 2)],
        output: "stone_pickaxe",
        output_quantity: 1,
    },
    Recipe {
        id: "bread",
        materials: &[("wheat", 3)],
        output: "bread",
        output_quantity: 1,
    },
];

pub fn recipe(recipe_id: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.id == recipe_id)
}

/// Only the player's own inventory is resolvable. Container inventories
/// need a location the action does not carry.
fn resolve(kind: InventoryKind) -> bool {
    kind == InventoryKind::Player
}

fn slot_stack(player: &PlayerState, slot: usize) -> Result<&ItemStack, ActionExecutionResult> {
    match player.inventory.get(slot) {
        None => Err(ActionExecutionResult::invalid("Slot index out of bounds")),
        Some(None) => Err(ActionExecutionResult::invalid("Slot is empty")),
        Some(Some(stack)) if stack.quantity == 0 => {
            Err(ActionExecutionResult::invalid("Slot is empty"))
        }
        Some(Some(stack)) => Ok(stack),
    }
}

fn check_quantity(requested: Option<u32>, available: u32) -> Result<u32, ActionExecutionResult> {
    let quantity = requested.unwrap_or(available);
    if quantity == 0 || quantity > available {
        return Err(ActionExecutionResult::invalid(format!(
            "Invalid quantity: {quantity} (available: {available})"
        )));
    }
    Ok(quantity)
}

pub(super) fn validate_move_item(
    source_type: InventoryKind,
    source_slot: usize,
    dest_type: InventoryKind,
    dest_slot: usize,
    quantity: Option<u32>,
    player: &PlayerState,
) -> ActionExecutionResult {
    if !resolve(source_type) || !resolve(dest_type) {
        return ActionExecutionResult::invalid("Invalid inventory type");
    }

    let len = player.inventory.len();
    if source_slot >= len || dest_slot >= len {
        return ActionExecutionResult::invalid("Slot index out of bounds");
    }

    let source = match slot_stack(player, source_slot) {
        Ok(stack) => stack,
        Err(_) => return ActionExecutionResult::invalid("Source slot is empty"),
    };
    let moved = match check_quantity(quantity, source.quantity) {
        Ok(moved) => moved,
        Err(rejection) => return rejection,
    };

    if source_slot != dest_slot {
        if let Some(dest) = &player.inventory[dest_slot] {
            if dest.item_type != source.item_type {
                return ActionExecutionResult::invalid("Cannot stack different item types");
            }
            if dest.quantity + moved > MAX_STACK {
                return ActionExecutionResult::invalid("Destination stack is full");
            }
        }
    }

    ActionExecutionResult::success("Item movement validated")
}

pub(super) fn execute_move_item(
    source_type: InventoryKind,
    source_slot: usize,
    dest_type: InventoryKind,
    dest_slot: usize,
    quantity: Option<u32>,
    player: &mut PlayerState,
) -> Result<ActionExecutionResult, ActionError> {
    for kind in [source_type, dest_type] {
        if !resolve(kind) {
            return Err(ActionError::InventoryUnavailable(kind));
        }
    }
    if dest_slot >= player.inventory.len() {
        return Err(ActionError::SlotOutOfRange { slot: dest_slot });
    }

    let source = player
        .inventory
        .get(source_slot)
        .ok_or(ActionError::SlotOutOfRange { slot: source_slot })?
        .clone()
        .ok_or(ActionError::SlotEmpty { slot: source_slot })?;

    let moved = quantity.unwrap_or(source.quantity);
    if moved == 0 || moved > source.quantity {
        return Err(ActionError::QuantityUnavailable {
            requested: moved,
            available: source.quantity,
        });
    }

    if source_slot != dest_slot {
        match &mut player.inventory[dest_slot] {
            Some(dest) if dest.item_type != source.item_type => {
                return Err(ActionError::StackMismatch {
                    source_item: source.item_type,
                    dest_item: dest.item_type.clone(),
                });
            }
            Some(dest) => dest.quantity += moved,
            empty => *empty = Some(ItemStack::new(source.item_type.clone(), moved)),
        }

        let remaining = source.quantity - moved;
        player.inventory[source_slot] =
            (remaining > 0).then(|| ItemStack::new(source.item_type.clone(), remaining));
    }

    debug!(
        "Player {} moved {} {} from slot {} to slot {}",
        player.player_id, moved, source.item_type, source_slot, dest_slot
    );

    Ok(
        ActionExecutionResult::success("Item moved successfully").with_data(json!({
            "source_type": source_type,
            "source_slot": source_slot,
            "dest_type": dest_type,
            "dest_slot": dest_slot,
            "quantity": moved,
            "item_type": source.item_type,
        })),
    )
}

pub(super) fn validate_craft(
    recipe_id: &str,
    quantity: u32,
    player: &PlayerState,
) -> ActionExecutionResult {
    let Some(recipe) = recipe(recipe_id) else {
        return ActionExecutionResult::invalid(format!("Unknown recipe: {recipe_id}"));
    };
    if quantity == 0 {
        return ActionExecutionResult::invalid("Craft quantity must be positive");
    }

    for (material, per_craft) in recipe.materials {
        let needed = per_craft.saturating_mul(quantity);
        let available = player.count_item(material);
        if available < needed {
            return ActionExecutionResult::insufficient_resources(format!(
                "Need {needed} {material}, have {available}"
            ));
        }
    }

    let output = recipe.output_quantity.saturating_mul(quantity);
    if player.capacity_for(recipe.output) < output {
        return ActionExecutionResult::insufficient_resources("Not enough inventory space");
    }

    ActionExecutionResult::success("Crafting validated")
}

fn refund(player: &mut PlayerState, consumed: &[(&str, u32)]) {
    for (material, amount) in consumed {
        player.add_item(material, *amount);
    }
}

pub(super) fn execute_craft(
    recipe_id: &str,
    quantity: u32,
    player: &mut PlayerState,
) -> Result<ActionExecutionResult, ActionError> {
    let recipe = recipe(recipe_id).ok_or_else(|| ActionError::UnknownRecipe(recipe_id.to_string()))?;

    let mut consumed: Vec<(&str, u32)> = Vec::with_capacity(recipe.materials.len());
    for (material, per_craft) in recipe.materials {
        let needed = per_craft.saturating_mul(quantity);
        let taken = player.remove_item(material, needed);
        consumed.push((*material, taken));
        if taken < needed {
            refund(player, &consumed);
            return Ok(ActionExecutionResult::failed(format!(
                "Failed to consume {material}"
            )));
        }
    }

    let output = recipe.output_quantity.saturating_mul(quantity);
    let added = player.add_item(recipe.output, output);
    if added < output {
        player.remove_item(recipe.output, added);
        refund(player, &consumed);
        return Ok(ActionExecutionResult::failed(
            "Failed to add crafted items to inventory",
        ));
    }

    debug!("Player {} crafted {}x {}", player.player_id, quantity, recipe_id);

    Ok(
        ActionExecutionResult::success("Item crafted successfully").with_data(json!({
            "recipe_id": recipe_id,
            "quantity": quantity,
            "output_item": recipe.output,
            "output_quantity": output,
        })),
    )
}

pub(super) fn validate_drop(
    slot: usize,
    quantity: Option<u32>,
    player: &PlayerState,
) -> ActionExecutionResult {
    let stack = match slot_stack(player, slot) {
        Ok(stack) => stack,
        Err(rejection) => return rejection,
    };
    match check_quantity(quantity, stack.quantity) {
        Ok(_) => ActionExecutionResult::success("Item dropping validated"),
        Err(rejection) => rejection,
    }
}

pub(super) fn execute_drop(
    slot: usize,
    quantity: Option<u32>,
    world: &mut dyn World,
    player: &mut PlayerState,
) -> Result<ActionExecutionResult, ActionError> {
    let (x, y) = (player.x, player.y);
    let entry = player
        .inventory
        .get_mut(slot)
        .ok_or(ActionError::SlotOutOfRange { slot })?;
    let stack = entry.as_mut().ok_or(ActionError::SlotEmpty { slot })?;

    let dropped = quantity.unwrap_or(stack.quantity);
    if dropped == 0 || dropped > stack.quantity {
        return Err(ActionError::QuantityUnavailable {
            requested: dropped,
            available: stack.quantity,
        });
    }

    let item_type = stack.item_type.clone();
    stack.quantity -= dropped;
    if stack.quantity == 0 {
        *entry = None;
    }

    let item_id = world.spawn_floating_item(&item_type, dropped, x, y);
    debug!("Player {} dropped {} {}", player.player_id, dropped, item_type);

    Ok(
        ActionExecutionResult::success("Item dropped successfully").with_data(json!({
            "slot": slot,
            "item_type": item_type,
            "quantity": dropped,
            "item_id": item_id,
            "position": [x, y],
        })),
    )
}

pub(super) fn validate_pickup(
    item_id: &str,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    let Some(item) = world.get_floating_item(item_id) else {
        return ActionExecutionResult::invalid(format!("Floating item {item_id} not found"));
    };

    let dist = distance(player.x, player.y, item.x, item.y);
    if dist > PICKUP_RADIUS {
        return ActionExecutionResult::invalid(format!(
            "Item too far away: {dist:.1} > {PICKUP_RADIUS}"
        ));
    }

    if player.capacity_for(&item.item_type) == 0 {
        return ActionExecutionResult::insufficient_resources("Not enough inventory space");
    }

    ActionExecutionResult::success("Item pickup validated")
}

pub(super) fn execute_pickup(
    item_id: &str,
    world: &mut dyn World,
    player: &mut PlayerState,
) -> ActionExecutionResult {
    let Some(item) = world.get_floating_item(item_id) else {
        return ActionExecutionResult::failed("Floating item no longer exists");
    };
    let item_type = item.item_type.clone();
    let available = item.quantity;

    let added = player.add_item(&item_type, available);
    if added == 0 {
        return ActionExecutionResult::insufficient_resources("Not enough inventory space");
    }

    let remaining = available - added;
    if remaining > 0 {
        if let Some(item) = world.get_floating_item_mut(item_id) {
            item.quantity = remaining;
        }
    } else {
        world.remove_floating_item(item_id);
    }

    debug!("Player {} picked up {} {}", player.player_id, added, item_type);

    ActionExecutionResult::success("Item picked up successfully").with_data(json!({
        "item_id": item_id,
        "item_type": item_type,
        "quantity": added,
        "remaining": remaining,
    }))
}

pub(super) fn validate_equip(
    slot: usize,
    equipment_slot: EquipmentSlot,
    player: &PlayerState,
) -> ActionExecutionResult {
    let stack = match slot_stack(player, slot) {
        Ok(stack) => stack,
        Err(rejection) => return rejection,
    };
    if !equipment_slot.accepts(&stack.item_type) {
        return ActionExecutionResult::invalid(format!(
            "Cannot equip {} in {:?} slot",
            stack.item_type, equipment_slot
        ));
    }
    ActionExecutionResult::success("Equipment validated")
}

pub(super) fn execute_equip(
    slot: usize,
    equipment_slot: EquipmentSlot,
    player: &mut PlayerState,
) -> Result<ActionExecutionResult, ActionError> {
    let stack = player
        .inventory
        .get(slot)
        .ok_or(ActionError::SlotOutOfRange { slot })?
        .clone()
        .ok_or(ActionError::SlotEmpty { slot })?;

    let previous = player.equipment.get(&equipment_slot).cloned();

    if stack.quantity > 1 {
        player.inventory[slot] = Some(ItemStack::new(stack.item_type.clone(), stack.quantity - 1));
        if let Some(prev) = &previous {
            if player.add_item(prev, 1) == 0 {
                player.inventory[slot] = Some(stack);
                return Ok(ActionExecutionResult::insufficient_resources(
                    "No room for the previously equipped item",
                ));
            }
        }
    } else {
        player.inventory[slot] = previous.as_ref().map(|prev| ItemStack::new(prev.clone(), 1));
    }

    player
        .equipment
        .insert(equipment_slot, stack.item_type.clone());

    debug!(
        "Player {} equipped {} in {:?}",
        player.player_id, stack.item_type, equipment_slot
    );

    Ok(
        ActionExecutionResult::success("Item equipped successfully").with_data(json!({
            "slot": slot,
            "equipment_slot": equipment_slot,
            "equipped_item": stack.item_type,
            "previous_item": previous,
        })),
    )
}
