//! # Game Server Library
//!
//! Authoritative server for the networked block-building game. Clients submit
//! actions over TCP; the server validates and executes them against the one
//! true world and player state, answers each sender with the outcome, and
//! replicates successful world changes to everyone else.
//!
//! ## Architecture
//!
//! A single main loop owns the game state and every client transport. Network
//! tasks only forward events into it through a channel:
//! - **Acceptor**: accepts TCP clients and starts a framed transport for each
//! - **Event pumps**: forward decoded messages and disconnects per client
//! - **Timeout checker**: drops clients that stopped talking
//! - **Main loop**: handles messages and, every tick, drains all client action
//!   queues in timestamp order through the action pipeline
//!
//! Because the world is only ever touched from the main loop, two players
//! racing for the same floating item or tile are resolved by timestamp order
//! alone.
//!
//! ## Modules
//!
//! - [`client_manager`]: roster of authenticated clients and their action queues
//! - [`config`]: server settings
//! - [`game`]: world, players and the action pipeline
//! - [`network`]: transports and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;

pub use client_manager::{ClientManager, ClientSession};
pub use config::ServerConfig;
pub use game::GameState;
pub use network::{Server, ServerHandle};
