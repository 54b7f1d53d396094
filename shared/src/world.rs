//! World and player-state providers consumed by the action pipeline
//!
//! Actions never own world data. They read and write it through the
//! [`World`] trait and mutate the acting player's [`PlayerState`], which keeps
//! the pipeline usable against the authoritative server world as well as a
//! client-side mirror.

use crate::{DEFAULT_WORLD_SIZE, MAX_STACK, TILE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Block id used for an empty tile
pub const AIR: u32 = 0;

/// A stack of identical items occupying one inventory slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_type: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item_type: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_type: item_type.into(),
            quantity,
        }
    }
}

/// An item lying in the world that players can pick up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingItem {
    pub item_id: String,
    pub item_type: String,
    pub quantity: u32,
    pub x: f32,
    pub y: f32,
}

/// Equipment slots a player can fill from their inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    Tool,
    Helmet,
    Chest,
    Legs,
    Boots,
}

impl EquipmentSlot {
    /// Item types allowed in this slot
    pub fn allowed_items(self) -> &'static [&'static str] {
        match self {
            EquipmentSlot::Tool => &[
                "wooden_pickaxe",
                "stone_pickaxe",
                "wooden_axe",
                "stone_axe",
                "sword",
            ],
            EquipmentSlot::Helmet => &["leather_helmet", "iron_helmet"],
            EquipmentSlot::Chest => &["leather_chestplate", "iron_chestplate"],
            EquipmentSlot::Legs => &["leather_leggings", "iron_leggings"],
            EquipmentSlot::Boots => &["leather_boots", "iron_boots"],
        }
    }

    pub fn accepts(self, item_type: &str) -> bool {
        self.allowed_items().contains(&item_type)
    }
}

/// Tile and floating-item access needed by actions
pub trait World {
    /// Half-extent of the world in tiles
    fn world_size(&self) -> u32 {
        DEFAULT_WORLD_SIZE
    }

    fn get_block(&self, x: i32, y: i32) -> u32;

    /// Writes a block, returning false if the world refused the change
    fn set_block(&mut self, x: i32, y: i32, block_id: u32, player_id: &str) -> bool;

    /// Spawns a floating item and returns its id
    fn spawn_floating_item(&mut self, item_type: &str, quantity: u32, x: f32, y: f32) -> String;

    fn get_floating_item(&self, item_id: &str) -> Option<&FloatingItem>;

    fn get_floating_item_mut(&mut self, item_id: &str) -> Option<&mut FloatingItem>;

    fn remove_floating_item(&mut self, item_id: &str) -> Option<FloatingItem>;

    /// World bounds in pixels, symmetric around the origin
    fn pixel_bounds(&self) -> f32 {
        self.world_size() as f32 * TILE_SIZE
    }
}

/// Mutable state of a single player as seen by the action pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: String,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub direction: String,
    pub health: u32,
    pub max_health: u32,
    pub is_admin: bool,
    pub on_ground: bool,
    pub inventory: Vec<Option<ItemStack>>,
    pub equipment: BTreeMap<EquipmentSlot, String>,
}

impl PlayerState {
    pub const DEFAULT_INVENTORY_SIZE: usize = 36;

    pub fn new(player_id: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            player_id: player_id.into(),
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            direction: "down".to_string(),
            health: 100,
            max_health: 100,
            is_admin: false,
            on_ground: true,
            inventory: vec![None; Self::DEFAULT_INVENTORY_SIZE],
            equipment: BTreeMap::new(),
        }
    }

    /// Replaces the inventory with one of `size` empty slots
    pub fn with_inventory_size(mut self, size: usize) -> Self {
        self.inventory = vec![None; size];
        self
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    pub fn count_item(&self, item_type: &str) -> u32 {
        self.inventory
            .iter()
            .flatten()
            .filter(|stack| stack.item_type == item_type)
            .map(|stack| stack.quantity)
            .sum()
    }

    pub fn empty_slots(&self) -> usize {
        self.inventory.iter().filter(|slot| slot.is_none()).count()
    }

    /// How many more `item_type` items fit, counting partial stacks and
    /// empty slots
    pub fn capacity_for(&self, item_type: &str) -> u32 {
        self.inventory
            .iter()
            .map(|slot| match slot {
                Some(stack) if stack.item_type == item_type => {
                    MAX_STACK.saturating_sub(stack.quantity)
                }
                Some(_) => 0,
                None => MAX_STACK,
            })
            .sum()
    }

    /// Adds up to `quantity` items, topping up existing stacks before using
    /// empty slots. Returns how many were actually added.
    pub fn add_item(&mut self, item_type: &str, quantity: u32) -> u32 {
        let mut remaining = quantity;

        for stack in self.inventory.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.item_type == item_type && stack.quantity < MAX_STACK {
                let moved = remaining.min(MAX_STACK - stack.quantity);
                stack.quantity += moved;
                remaining -= moved;
            }
        }

        for slot in self.inventory.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let moved = remaining.min(MAX_STACK);
                *slot = Some(ItemStack::new(item_type, moved));
                remaining -= moved;
            }
        }

        quantity - remaining
    }

    /// Removes up to `quantity` items. Returns how many were actually removed.
    pub fn remove_item(&mut self, item_type: &str, quantity: u32) -> u32 {
        let mut remaining = quantity;

        for slot in self.inventory.iter_mut() {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = slot {
                if stack.item_type == item_type {
                    let taken = remaining.min(stack.quantity);
                    stack.quantity -= taken;
                    remaining -= taken;
                    if stack.quantity == 0 {
                        *slot = None;
                    }
                }
            }
        }

        quantity - remaining
    }
}

/// In-memory [`World`] backed by hash maps
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    blocks: HashMap<(i32, i32), u32>,
    floating_items: HashMap<String, FloatingItem>,
    world_size: u32,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WORLD_SIZE)
    }

    pub fn with_size(world_size: u32) -> Self {
        Self {
            blocks: HashMap::new(),
            floating_items: HashMap::new(),
            world_size,
        }
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        let limit = self.world_size as i64;
        (-limit..=limit).contains(&(x as i64)) && (-limit..=limit).contains(&(y as i64))
    }

    pub fn floating_items(&self) -> impl Iterator<Item = &FloatingItem> {
        self.floating_items.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl World for MemoryWorld {
    fn world_size(&self) -> u32 {
        self.world_size
    }

    fn get_block(&self, x: i32, y: i32) -> u32 {
        self.blocks.get(&(x, y)).copied().unwrap_or(AIR)
    }

    fn set_block(&mut self, x: i32, y: i32, block_id: u32, _player_id: &str) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        if block_id == AIR {
            self.blocks.remove(&(x, y));
        } else {
            self.blocks.insert((x, y), block_id);
        }
        true
    }

    fn spawn_floating_item(&mut self, item_type: &str, quantity: u32, x: f32, y: f32) -> String {
        let item_id = Uuid::new_v4().to_string();
        self.floating_items.insert(
            item_id.clone(),
            FloatingItem {
                item_id: item_id.clone(),
                item_type: item_type.to_string(),
                quantity,
                x,
                y,
            },
        );
        item_id
    }

    fn get_floating_item(&self, item_id: &str) -> Option<&FloatingItem> {
        self.floating_items.get(item_id)
    }

    fn get_floating_item_mut(&mut self, item_id: &str) -> Option<&mut FloatingItem> {
        self.floating_items.get_mut(item_id)
    }

    fn remove_floating_item(&mut self, item_id: &str) -> Option<FloatingItem> {
        self.floating_items.remove(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_creation() {
        let player = PlayerState::new("p1", 100.0, 200.0);
        assert_eq!(player.player_id, "p1");
        assert_eq!(player.x, 100.0);
        assert_eq!(player.y, 200.0);
        assert_eq!(player.inventory.len(), PlayerState::DEFAULT_INVENTORY_SIZE);
        assert_eq!(player.empty_slots(), PlayerState::DEFAULT_INVENTORY_SIZE);
        assert!(player.on_ground);
    }

    #[test]
    fn test_add_item_tops_up_existing_stack() {
        let mut player = PlayerState::new("p1", 0.0, 0.0).with_inventory_size(3);
        player.inventory[1] = Some(ItemStack::new("wood", 60));

        let added = player.add_item("wood", 10);
        assert_eq!(added, 10);
        assert_eq!(player.inventory[1], Some(ItemStack::new("wood", 64)));
        assert_eq!(player.inventory[0], Some(ItemStack::new("wood", 6)));
        assert_eq!(player.count_item("wood"), 70);
    }

    #[test]
    fn test_add_item_reports_partial_when_full() {
        let mut player = PlayerState::new("p1", 0.0, 0.0).with_inventory_size(1);
        player.inventory[0] = Some(ItemStack::new("stone", 60));

        let added = player.add_item("stone", 10);
        assert_eq!(added, 4);
        assert_eq!(player.count_item("stone"), 64);
    }

    #[test]
    fn test_capacity_for() {
        let mut player = PlayerState::new("p1", 0.0, 0.0).with_inventory_size(3);
        player.inventory[0] = Some(ItemStack::new("wood", 60));
        player.inventory[1] = Some(ItemStack::new("stone", 1));

        assert_eq!(player.capacity_for("wood"), 4 + MAX_STACK);
        assert_eq!(player.capacity_for("bread"), MAX_STACK);
    }

    #[test]
    fn test_remove_item_clears_empty_slots() {
        let mut player = PlayerState::new("p1", 0.0, 0.0).with_inventory_size(3);
        player.inventory[0] = Some(ItemStack::new("stick", 2));
        player.inventory[2] = Some(ItemStack::new("stick", 5));

        let removed = player.remove_item("stick", 4);
        assert_eq!(removed, 4);
        assert!(player.inventory[0].is_none());
        assert_eq!(player.inventory[2], Some(ItemStack::new("stick", 3)));

        let removed = player.remove_item("stick", 10);
        assert_eq!(removed, 3);
        assert_eq!(player.count_item("stick"), 0);
    }

    #[test]
    fn test_memory_world_blocks() {
        let mut world = MemoryWorld::with_size(10);
        assert_eq!(world.get_block(1, 1), AIR);

        assert!(world.set_block(1, 1, 7, "p1"));
        assert_eq!(world.get_block(1, 1), 7);
        assert_eq!(world.block_count(), 1);

        assert!(world.set_block(1, 1, AIR, "p1"));
        assert_eq!(world.block_count(), 0);

        assert!(!world.set_block(11, 0, 7, "p1"));
    }

    #[test]
    fn test_memory_world_floating_items() {
        let mut world = MemoryWorld::new();
        let id = world.spawn_floating_item("block_3", 2, 10.0, 20.0);

        let item = world.get_floating_item(&id).unwrap();
        assert_eq!(item.item_type, "block_3");
        assert_eq!(item.quantity, 2);

        world.get_floating_item_mut(&id).unwrap().quantity = 1;
        assert_eq!(world.get_floating_item(&id).unwrap().quantity, 1);

        assert!(world.remove_floating_item(&id).is_some());
        assert!(world.get_floating_item(&id).is_none());
    }

    #[test]
    fn test_equipment_rules() {
        assert!(EquipmentSlot::Tool.accepts("wooden_pickaxe"));
        assert!(!EquipmentSlot::Tool.accepts("iron_helmet"));
        assert!(EquipmentSlot::Helmet.accepts("iron_helmet"));
        assert!(!EquipmentSlot::Boots.accepts("dirt"));
    }
}
