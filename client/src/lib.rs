//! # Game Client Library
//!
//! Client side of the networked sandbox game: it opens a framed TCP session to
//! the server, authenticates, submits player actions and tracks their results.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Connection settings and the [`ReconnectPolicy`] with its exponential
//! backoff and optional jitter.
//!
//! ### Connection Manager Module (`connection_manager`)
//! The connection lifecycle state machine:
//! - `Disconnected -> Connecting -> Connected -> Authenticating -> Authenticated`
//! - automatic reconnection after an unexpected loss, ending in `Error` once
//!   the attempt budget is spent
//! - periodic pings, silence timeout detection and health threshold events
//!
//! ### Network Module (`network`)
//! The TCP [`Connector`] and the [`Client`] session that routes server
//! messages (pongs, action results, replicated actions) to the manager and to
//! the application.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{Client, ClientConfig};
//! use shared::{Action, ActionKind};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect(ClientConfig::default()).await?;
//!
//! let action = Action::new("", ActionKind::Jump { jump_strength: 1.0 });
//! let action_id = client.send_action(action).await?;
//! let result = client.wait_for_result(&action_id, Duration::from_secs(2)).await;
//! println!("{:?}", result);
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection_manager;
pub mod network;

pub use config::{ClientConfig, ReconnectPolicy};
pub use connection_manager::{
    ConnectionHealth, ConnectionManager, ConnectionState, ConnectionStats, Connector,
    DisconnectReason, EventKind, ManagerEvent,
};
pub use network::{Client, ClientEvent, TcpConnector};
