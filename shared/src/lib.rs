//! # Shared Game Networking Library
//!
//! Code used by both the authoritative server and the client:
//!
//! - [`actions`]: player intents as validated, serializable commands, plus the
//!   validator, handler, registry and queue that run them
//! - [`world`]: the world/player-state provider the actions operate on
//! - [`protocol`]: message types, the length-prefixed envelope codec and the
//!   stream frame decoder
//! - [`connection`]: the framed TCP transport with dedicated receive and send
//!   tasks
//! - [`collections`]: capacity-bounded logs and maps used throughout
//!
//! Both peers run the same action pipeline, so a client can execute an action
//! speculatively and the server will reach the same verdict when it
//! re-validates.

pub mod actions;
pub mod collections;
pub mod connection;
pub mod protocol;
pub mod world;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use actions::{
    Action, ActionError, ActionExecutionResult, ActionHandler, ActionKind, ActionQueue,
    ActionRegistry, ActionResult, ActionType, ActionValidator, InventoryKind,
};
pub use connection::{Connection, ConnectionError, TransportEvent, TransportStats};
pub use protocol::{Envelope, FrameDecoder, MessageType, Protocol, ProtocolError};
pub use world::{EquipmentSlot, FloatingItem, ItemStack, MemoryWorld, PlayerState, World};

/// Side length of one tile in pixels
pub const TILE_SIZE: f32 = 32.0;
/// Maximum distance from a player to a tile centre they can act on
pub const MELEE_REACH: f32 = 96.0;
/// Maximum distance from a player to a floating item they can pick up
pub const PICKUP_RADIUS: f32 = 32.0;
/// Base walking speed; movement faster than twice this is rejected
pub const WALK_SPEED: f32 = 300.0;
/// Tiles per chunk edge
pub const CHUNK_SIZE: i32 = 32;
/// Default half-extent of the world in tiles
pub const DEFAULT_WORLD_SIZE: u32 = 1000;
/// Largest quantity a single inventory slot holds
pub const MAX_STACK: u32 = 64;

/// Current wall-clock time in fractional seconds since the Unix epoch
pub fn timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn timestamp_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

/// Pixel coordinates of the centre of tile `(x, y)`
pub fn tile_center(x: i32, y: i32) -> (f32, f32) {
    (
        x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
    )
}

/// Euclidean distance between two points
pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = ax - bx;
    let dy = ay - by;
    (dx * dx + dy * dy).sqrt()
}
