//! Player intents expressed as discrete, validated commands
//!
//! An [`Action`] carries its identity (id, player, creation time), the policy
//! the pipeline applies to it (validation, cooldown, resource cost) and an
//! [`ActionKind`] payload. Every kind is a case of one closed enum, so the
//! validator and handler match exhaustively and adding a kind is checked by
//! the compiler.
//!
//! `validate` only reads the world and player. All mutation happens in
//! `execute`.

mod blocks;
mod handler;
mod inventory;
mod movement;
mod queue;
mod registry;
mod validator;

pub use handler::{ActionHandler, HandlerStats};
pub use inventory::{recipe, InventoryKind, Recipe};
pub use queue::ActionQueue;
pub use registry::{ActionRegistry, RegistryStats};
pub use validator::{ActionValidator, ValidationRule, DEFAULT_COOLDOWN};

use crate::timestamp_secs;
use crate::world::{EquipmentSlot, PlayerState, World};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outcome category of validating or executing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failed,
    Invalid,
    Unauthorized,
    Cooldown,
    InsufficientResources,
}

/// Result of validating or executing an action, with a message and
/// free-form result data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecutionResult {
    pub result: ActionResult,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ActionExecutionResult {
    pub fn new(result: ActionResult, message: impl Into<String>) -> Self {
        Self {
            result,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ActionResult::Success, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ActionResult::Failed, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ActionResult::Invalid, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ActionResult::Unauthorized, message)
    }

    pub fn cooldown(message: impl Into<String>) -> Self {
        Self::new(ActionResult::Cooldown, message)
    }

    pub fn insufficient_resources(message: impl Into<String>) -> Self {
        Self::new(ActionResult::InsufficientResources, message)
    }

    /// Attaches result data. Non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == ActionResult::Success
    }

    pub fn is_failed(&self) -> bool {
        !self.is_success()
    }
}

/// Faults raised while executing an action whose preconditions no longer
/// hold. The handler turns these into `Failed` results.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("malformed action data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("slot {slot} is out of range")]
    SlotOutOfRange { slot: usize },

    #[error("slot {slot} is empty")]
    SlotEmpty { slot: usize },

    #[error("cannot move {requested} items, only {available} available")]
    QuantityUnavailable { requested: u32, available: u32 },

    #[error("cannot stack {source_item} onto {dest_item}")]
    StackMismatch { source_item: String, dest_item: String },

    #[error("inventory {0:?} is not available")]
    InventoryUnavailable(InventoryKind),

    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),
}

/// String tag identifying each kind of action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Stop,
    Jump,
    Teleport,
    PlaceBlock,
    BreakBlock,
    Interact,
    PlantSeed,
    MoveItem,
    CraftItem,
    DropItem,
    PickupItem,
    EquipItem,
}

impl ActionType {
    pub const ALL: [ActionType; 13] = [
        ActionType::Move,
        ActionType::Stop,
        ActionType::Jump,
        ActionType::Teleport,
        ActionType::PlaceBlock,
        ActionType::BreakBlock,
        ActionType::Interact,
        ActionType::PlantSeed,
        ActionType::MoveItem,
        ActionType::CraftItem,
        ActionType::DropItem,
        ActionType::PickupItem,
        ActionType::EquipItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Move => "move",
            ActionType::Stop => "stop",
            ActionType::Jump => "jump",
            ActionType::Teleport => "teleport",
            ActionType::PlaceBlock => "place_block",
            ActionType::BreakBlock => "break_block",
            ActionType::Interact => "interact",
            ActionType::PlantSeed => "plant_seed",
            ActionType::MoveItem => "move_item",
            ActionType::CraftItem => "craft_item",
            ActionType::DropItem => "drop_item",
            ActionType::PickupItem => "pickup_item",
            ActionType::EquipItem => "equip_item",
        }
    }

    /// Dispatch priority, 1 being the most urgent
    pub fn priority(self) -> u8 {
        match self {
            ActionType::Move | ActionType::Stop | ActionType::Jump => 1,
            ActionType::PlaceBlock
            | ActionType::BreakBlock
            | ActionType::Interact
            | ActionType::PickupItem => 2,
            ActionType::MoveItem
            | ActionType::CraftItem
            | ActionType::DropItem
            | ActionType::EquipItem => 3,
            ActionType::Teleport | ActionType::PlantSeed => 4,
        }
    }

    /// Whether a successful action of this type changes what other players
    /// see and should be replicated to them
    pub fn changes_world(self) -> bool {
        matches!(
            self,
            ActionType::PlaceBlock
                | ActionType::BreakBlock
                | ActionType::Interact
                | ActionType::PlantSeed
                | ActionType::DropItem
                | ActionType::PickupItem
                | ActionType::Move
                | ActionType::Stop
                | ActionType::Teleport
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ActionError::UnknownActionType(s.to_string()))
    }
}

/// Action-specific parameters, tagged by `action_type` when serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionKind {
    Move {
        direction: String,
        velocity_x: f32,
        velocity_y: f32,
    },
    Stop,
    Jump {
        jump_strength: f32,
    },
    Teleport {
        target_x: f32,
        target_y: f32,
    },
    PlaceBlock {
        x: i32,
        y: i32,
        block_id: u32,
    },
    BreakBlock {
        x: i32,
        y: i32,
    },
    Interact {
        x: i32,
        y: i32,
        interaction_type: String,
    },
    PlantSeed {
        x: i32,
        y: i32,
        seed_type: String,
    },
    MoveItem {
        source_type: InventoryKind,
        source_slot: usize,
        dest_type: InventoryKind,
        dest_slot: usize,
        #[serde(default)]
        quantity: Option<u32>,
    },
    CraftItem {
        recipe_id: String,
        quantity: u32,
    },
    DropItem {
        slot: usize,
        #[serde(default)]
        quantity: Option<u32>,
    },
    PickupItem {
        item_id: String,
    },
    EquipItem {
        slot: usize,
        equipment_slot: EquipmentSlot,
    },
}

/// Pipeline policy attached to an action at construction
struct Policy {
    requires_validation: bool,
    cooldown_seconds: f64,
    cost_resources: BTreeMap<String, u32>,
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::Move { .. } => ActionType::Move,
            ActionKind::Stop => ActionType::Stop,
            ActionKind::Jump { .. } => ActionType::Jump,
            ActionKind::Teleport { .. } => ActionType::Teleport,
            ActionKind::PlaceBlock { .. } => ActionType::PlaceBlock,
            ActionKind::BreakBlock { .. } => ActionType::BreakBlock,
            ActionKind::Interact { .. } => ActionType::Interact,
            ActionKind::PlantSeed { .. } => ActionType::PlantSeed,
            ActionKind::MoveItem { .. } => ActionType::MoveItem,
            ActionKind::CraftItem { .. } => ActionType::CraftItem,
            ActionKind::DropItem { .. } => ActionType::DropItem,
            ActionKind::PickupItem { .. } => ActionType::PickupItem,
            ActionKind::EquipItem { .. } => ActionType::EquipItem,
        }
    }

    fn policy(&self) -> Policy {
        let (requires_validation, cooldown_seconds) = match self {
            ActionKind::Move { .. } => (true, 0.0),
            ActionKind::Stop => (false, 0.0),
            ActionKind::Jump { .. } => (true, 0.5),
            ActionKind::Teleport { .. } => (true, 5.0),
            ActionKind::PlaceBlock { .. } => (true, 0.1),
            ActionKind::BreakBlock { .. } => (true, 0.2),
            ActionKind::Interact { .. } => (true, 0.1),
            ActionKind::PlantSeed { .. } => (true, 0.5),
            ActionKind::MoveItem { .. } => (true, 0.05),
            ActionKind::CraftItem { .. } => (true, 0.2),
            ActionKind::DropItem { .. } => (true, 0.1),
            ActionKind::PickupItem { .. } => (true, 0.1),
            ActionKind::EquipItem { .. } => (true, 0.1),
        };

        let mut cost_resources = BTreeMap::new();
        match self {
            ActionKind::Jump { .. } => {
                cost_resources.insert("energy".to_string(), 5);
            }
            ActionKind::PlaceBlock { block_id, .. } => {
                cost_resources.insert(blocks::block_item(*block_id), 1);
            }
            ActionKind::PlantSeed { seed_type, .. } => {
                cost_resources.insert(seed_type.clone(), 1);
            }
            _ => {}
        }

        Policy {
            requires_validation,
            cooldown_seconds,
            cost_resources,
        }
    }

    /// Movement kinds can be executed repeatedly
    pub fn allows_multiple_execution(&self) -> bool {
        matches!(self, ActionKind::Move { .. } | ActionKind::Stop)
    }
}

/// A serializable, validated unit of player intent
#[derive(Debug, Clone)]
pub struct Action {
    action_id: String,
    player_id: String,
    timestamp: f64,
    pub requires_validation: bool,
    pub cooldown_seconds: f64,
    pub cost_resources: BTreeMap<String, u32>,
    executed: bool,
    execution_result: Option<ActionExecutionResult>,
    kind: ActionKind,
}

/// Flat wire form of an action: identity fields plus the tagged payload
#[derive(Serialize, Deserialize)]
struct ActionRecord {
    action_id: String,
    player_id: String,
    timestamp: f64,
    #[serde(default)]
    executed: bool,
    #[serde(flatten)]
    kind: ActionKind,
}

impl Action {
    /// Creates an action with a fresh id stamped with the current time
    pub fn new(player_id: impl Into<String>, kind: ActionKind) -> Self {
        Self::with_identity(Uuid::new_v4().to_string(), player_id, timestamp_secs(), kind)
    }

    /// Creates an action with a caller-supplied id and timestamp
    pub fn with_identity(
        action_id: impl Into<String>,
        player_id: impl Into<String>,
        timestamp: f64,
        kind: ActionKind,
    ) -> Self {
        let policy = kind.policy();
        Self {
            action_id: action_id.into(),
            player_id: player_id.into(),
            timestamp,
            requires_validation: policy.requires_validation,
            cooldown_seconds: policy.cooldown_seconds,
            cost_resources: policy.cost_resources,
            executed: false,
            execution_result: None,
            kind,
        }
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn execution_result(&self) -> Option<&ActionExecutionResult> {
        self.execution_result.as_ref()
    }

    pub fn allows_multiple_execution(&self) -> bool {
        self.kind.allows_multiple_execution()
    }

    /// Rebinds the action to another player, e.g. when the server stamps an
    /// incoming action with the sender's authenticated id
    pub fn set_player_id(&mut self, player_id: impl Into<String>) {
        self.player_id = player_id.into();
    }

    pub(crate) fn record_execution(&mut self, result: ActionExecutionResult) {
        self.executed = true;
        self.execution_result = Some(result);
    }

    /// Checks the action's own rules without touching any state
    pub fn validate(&self, world: &dyn World, player: &PlayerState) -> ActionExecutionResult {
        match &self.kind {
            ActionKind::Move {
                velocity_x,
                velocity_y,
                ..
            } => movement::validate_move(*velocity_x, *velocity_y, world, player),
            ActionKind::Stop => ActionExecutionResult::success("Stop validated"),
            ActionKind::Jump { jump_strength } => movement::validate_jump(*jump_strength, player),
            ActionKind::Teleport { target_x, target_y } => {
                movement::validate_teleport(*target_x, *target_y, world, player)
            }
            ActionKind::PlaceBlock { x, y, block_id } => {
                blocks::validate_place(*x, *y, *block_id, world, player)
            }
            ActionKind::BreakBlock { x, y } => blocks::validate_break(*x, *y, world, player),
            ActionKind::Interact { x, y, .. } => blocks::validate_interact(*x, *y, world, player),
            ActionKind::PlantSeed { x, y, .. } => blocks::validate_plant(*x, *y, world, player),
            ActionKind::MoveItem {
                source_type,
                source_slot,
                dest_type,
                dest_slot,
                quantity,
            } => inventory::validate_move_item(
                *source_type,
                *source_slot,
                *dest_type,
                *dest_slot,
                *quantity,
                player,
            ),
            ActionKind::CraftItem {
                recipe_id,
                quantity,
            } => inventory::validate_craft(recipe_id, *quantity, player),
            ActionKind::DropItem { slot, quantity } => {
                inventory::validate_drop(*slot, *quantity, player)
            }
            ActionKind::PickupItem { item_id } => {
                inventory::validate_pickup(item_id, world, player)
            }
            ActionKind::EquipItem {
                slot,
                equipment_slot,
            } => inventory::validate_equip(*slot, *equipment_slot, player),
        }
    }

    /// Applies the action to the world and player
    pub fn execute(
        &self,
        world: &mut dyn World,
        player: &mut PlayerState,
    ) -> Result<ActionExecutionResult, ActionError> {
        let result = match &self.kind {
            ActionKind::Move {
                direction,
                velocity_x,
                velocity_y,
            } => movement::execute_move(direction, *velocity_x, *velocity_y, player),
            ActionKind::Stop => movement::execute_stop(player),
            ActionKind::Jump { jump_strength } => movement::execute_jump(*jump_strength, player),
            ActionKind::Teleport { target_x, target_y } => {
                movement::execute_teleport(*target_x, *target_y, player)
            }
            ActionKind::PlaceBlock { x, y, block_id } => {
                blocks::execute_place(*x, *y, *block_id, &self.player_id, world, player)
            }
            ActionKind::BreakBlock { x, y } => {
                blocks::execute_break(*x, *y, &self.player_id, world)
            }
            ActionKind::Interact {
                x,
                y,
                interaction_type,
            } => blocks::execute_interact(*x, *y, interaction_type, world),
            ActionKind::PlantSeed { x, y, seed_type } => {
                blocks::execute_plant(*x, *y, seed_type, &self.player_id, world, player)
            }
            ActionKind::MoveItem {
                source_type,
                source_slot,
                dest_type,
                dest_slot,
                quantity,
            } => inventory::execute_move_item(
                *source_type,
                *source_slot,
                *dest_type,
                *dest_slot,
                *quantity,
                player,
            )?,
            ActionKind::CraftItem {
                recipe_id,
                quantity,
            } => inventory::execute_craft(recipe_id, *quantity, player)?,
            ActionKind::DropItem { slot, quantity } => {
                inventory::execute_drop(*slot, *quantity, world, player)?
            }
            ActionKind::PickupItem { item_id } => inventory::execute_pickup(item_id, world, player),
            ActionKind::EquipItem {
                slot,
                equipment_slot,
            } => inventory::execute_equip(*slot, *equipment_slot, player)?,
        };
        Ok(result)
    }

    /// Reports whether the action would currently pass its own validation.
    /// Never mutates the action, world or player.
    pub fn can_execute(&self, world: &dyn World, player: &PlayerState) -> bool {
        if self.executed && !self.allows_multiple_execution() {
            return false;
        }
        if !self.requires_validation {
            return true;
        }
        self.validate(world, player).is_success()
    }

    /// Flat key-value form carrying the type tag, identity and every payload
    /// field
    pub fn get_serializable_data(&self) -> Map<String, Value> {
        let record = ActionRecord {
            action_id: self.action_id.clone(),
            player_id: self.player_id.clone(),
            timestamp: self.timestamp,
            executed: self.executed,
            kind: self.kind.clone(),
        };
        // Plain structs and enums always serialize into a JSON object
        match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Rebuilds an action from [`Action::get_serializable_data`] output
    pub fn from_serializable_data(data: &Map<String, Value>) -> Result<Self, ActionError> {
        match data.get("action_type").and_then(Value::as_str) {
            Some(tag) => {
                ActionType::from_str(tag)?;
            }
            None => return Err(ActionError::UnknownActionType(String::new())),
        }

        let record: ActionRecord = serde_json::from_value(Value::Object(data.clone()))?;
        let mut action =
            Self::with_identity(record.action_id, record.player_id, record.timestamp, record.kind);
        action.executed = record.executed;
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short_id: String = self.action_id.chars().take(8).collect();
        write!(f, "{}({}...)", self.action_type(), short_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::MemoryWorld;
    use serde_json::json;

    fn all_kinds() -> Vec<ActionKind> {
        vec![
            ActionKind::Move {
                direction: "left".to_string(),
                velocity_x: -120.5,
                velocity_y: 0.25,
            },
            ActionKind::Stop,
            ActionKind::Jump { jump_strength: 1.5 },
            ActionKind::Teleport {
                target_x: 640.0,
                target_y: -32.5,
            },
            ActionKind::PlaceBlock {
                x: 3,
                y: -3,
                block_id: 7,
            },
            ActionKind::BreakBlock { x: -10, y: 4 },
            ActionKind::Interact {
                x: 1,
                y: 2,
                interaction_type: "open".to_string(),
            },
            ActionKind::PlantSeed {
                x: 5,
                y: 6,
                seed_type: "carrot_seed".to_string(),
            },
            ActionKind::MoveItem {
                source_type: InventoryKind::Player,
                source_slot: 0,
                dest_type: InventoryKind::Chest,
                dest_slot: 4,
                quantity: Some(12),
            },
            ActionKind::MoveItem {
                source_type: InventoryKind::Player,
                source_slot: 1,
                dest_type: InventoryKind::Player,
                dest_slot: 2,
                quantity: None,
            },
            ActionKind::CraftItem {
                recipe_id: "bread".to_string(),
                quantity: 2,
            },
            ActionKind::DropItem {
                slot: 3,
                quantity: None,
            },
            ActionKind::PickupItem {
                item_id: "item-42".to_string(),
            },
            ActionKind::EquipItem {
                slot: 8,
                equipment_slot: EquipmentSlot::Helmet,
            },
        ]
    }

    #[test]
    fn test_serializable_data_roundtrip_preserves_fields() {
        for kind in all_kinds() {
            let action = Action::new("player_123", kind.clone());
            let data = action.get_serializable_data();

            assert_eq!(
                data.get("action_type").and_then(Value::as_str),
                Some(kind.action_type().as_str())
            );
            assert!(data.contains_key("action_id"));
            assert!(data.contains_key("player_id"));
            assert!(data.contains_key("timestamp"));

            let restored = Action::from_serializable_data(&data).unwrap();
            assert_eq!(restored.action_id(), action.action_id());
            assert_eq!(restored.player_id(), action.player_id());
            assert_eq!(restored.timestamp(), action.timestamp());
            assert_eq!(restored.kind(), action.kind());
            assert_eq!(restored.cooldown_seconds, action.cooldown_seconds);
            assert_eq!(restored.cost_resources, action.cost_resources);
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Action::new("p", ActionKind::Stop);
        let b = Action::new("p", ActionKind::Stop);
        assert_ne!(a.action_id(), b.action_id());
    }

    #[test]
    fn test_supplied_identity_is_kept() {
        let action = Action::with_identity("fixed-id", "p1", 1234.5, ActionKind::Stop);
        assert_eq!(action.action_id(), "fixed-id");
        assert_eq!(action.timestamp(), 1234.5);
        assert!(!action.executed());
        assert!(action.execution_result().is_none());
    }

    #[test]
    fn test_policy_per_kind() {
        let place = Action::new(
            "p",
            ActionKind::PlaceBlock {
                x: 0,
                y: 0,
                block_id: 7,
            },
        );
        assert!(place.requires_validation);
        assert_eq!(place.cooldown_seconds, 0.1);
        assert_eq!(place.cost_resources.get("block_7"), Some(&1));

        let jump = Action::new("p", ActionKind::Jump { jump_strength: 1.0 });
        assert_eq!(jump.cost_resources.get("energy"), Some(&5));

        let stop = Action::new("p", ActionKind::Stop);
        assert!(!stop.requires_validation);
        assert!(stop.allows_multiple_execution());
        assert_eq!(stop.cooldown_seconds, 0.0);
    }

    #[test]
    fn test_from_data_rejects_unknown_type() {
        let data = json!({
            "action_type": "fly",
            "action_id": "a",
            "player_id": "p",
            "timestamp": 1.0
        });
        let map = data.as_object().unwrap();
        assert!(matches!(
            Action::from_serializable_data(map),
            Err(ActionError::UnknownActionType(t)) if t == "fly"
        ));
    }

    #[test]
    fn test_from_data_rejects_missing_fields() {
        let data = json!({
            "action_type": "place_block",
            "action_id": "a",
            "player_id": "p",
            "timestamp": 1.0,
            "x": 1
        });
        let result = Action::from_serializable_data(data.as_object().unwrap());
        assert!(matches!(result, Err(ActionError::Malformed(_))));
    }

    #[test]
    fn test_from_data_accepts_missing_optional_quantity() {
        let data = json!({
            "action_type": "drop_item",
            "action_id": "a",
            "player_id": "p",
            "timestamp": 1.0,
            "slot": 2
        });
        let action = Action::from_serializable_data(data.as_object().unwrap()).unwrap();
        assert_eq!(
            action.kind(),
            &ActionKind::DropItem {
                slot: 2,
                quantity: None
            }
        );
    }

    #[test]
    fn test_can_execute_has_no_side_effects() {
        let world = MemoryWorld::new();
        let mut player = PlayerState::new("p", 0.0, 0.0);
        player.add_item("block_7", 1);

        let action = Action::new(
            "p",
            ActionKind::PlaceBlock {
                x: 0,
                y: 0,
                block_id: 7,
            },
        );

        assert!(action.can_execute(&world, &player));
        assert_eq!(player.count_item("block_7"), 1);
        assert_eq!(world.get_block(0, 0), 0);
        assert!(!action.executed());
    }

    #[test]
    fn test_can_execute_false_after_single_execution() {
        let mut world = MemoryWorld::new();
        let mut player = PlayerState::new("p", 0.0, 0.0);
        player.add_item("wood", 10);
        player.add_item("stick", 10);

        let mut action = Action::new(
            "p",
            ActionKind::CraftItem {
                recipe_id: "wooden_pickaxe".to_string(),
                quantity: 1,
            },
        );
        let result = action.execute(&mut world, &mut player).unwrap();
        action.record_execution(result);

        assert!(!action.can_execute(&world, &player));
    }

    #[test]
    fn test_display_uses_short_id() {
        let action = Action::with_identity("abcdef0123456789", "p", 0.0, ActionKind::Stop);
        assert_eq!(action.to_string(), "stop(abcdef01...)");
    }

    #[test]
    fn test_action_type_parsing_and_priority() {
        for action_type in ActionType::ALL {
            assert_eq!(action_type.as_str().parse::<ActionType>().unwrap(), action_type);
        }
        assert_eq!(ActionType::Move.priority(), 1);
        assert_eq!(ActionType::PickupItem.priority(), 2);
        assert_eq!(ActionType::CraftItem.priority(), 3);
        assert_eq!(ActionType::Teleport.priority(), 4);
        assert!("fly".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_result_with_data() {
        let result = ActionExecutionResult::success("ok").with_data(json!({"a": 1}));
        assert!(result.is_success());
        assert_eq!(result.data.get("a"), Some(&json!(1)));

        let failed = ActionExecutionResult::cooldown("wait");
        assert!(failed.is_failed());
        assert_eq!(failed.result, ActionResult::Cooldown);
    }
}
