//! # Pong Server Library
//!
//! Authoritative server for a two-paddle Pong match played over WebSockets.
//! The server owns the only copy of the game, advances it at a fixed tick
//! rate, and streams JSON snapshots to every connected client. Clients are
//! interchangeable: any of them may steer either paddle, hand a paddle to the
//! automated policy, reset the match or ask for the current state.
//!
//! ## Architecture
//!
//! ### Single Writer
//! One driver task owns the game session, the control modes and the pending
//! human inputs. Connection tasks never touch them; they send commands over a
//! bounded channel and the driver applies them between ticks. Ticks are
//! therefore never interleaved with input or mode changes.
//!
//! ### Fan-out
//! The connection registry is the only structure shared across tasks. Each
//! connection has a small outbound queue. A broadcast that finds a queue full
//! skips that connection for that snapshot; a closed queue gets the
//! connection dropped. One slow client never stalls the tick loop.
//!
//! ## Module Organization
//!
//! ### Simulation (`game`, `physics`, `policy`)
//! - Rules-engine contract and the game session wrapped around it
//! - Pixel-stepped Pong physics with seeded serves
//! - Ball-tracking policy backing `ai` mode
//!
//! ### Control (`input_router`, `control_mode`, `driver`)
//! - Latest-wins human input per paddle
//! - Per-paddle human/ai selection
//! - Tick loop, reset, terminal hold and broadcast cadence
//!
//! ### Networking (`connections`, `session`, `network`)
//! - Connection registry and snapshot fan-out
//! - Inbound message validation and dispatch
//! - WebSocket accept loop and per-connection reader/writer tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pong_server::config::ServerConfig;
//! use pong_server::connections::ConnectionRegistry;
//! use pong_server::driver::{DriverHandle, SimulationDriver};
//! use pong_server::network::WebSocketServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let registry = Arc::new(ConnectionRegistry::new());
//!
//!     let driver = SimulationDriver::from_config(&config, Arc::clone(&registry));
//!     let handle = DriverHandle::spawn(driver, config.command_capacity);
//!
//!     let server = WebSocketServer::bind(config.bind_addr).await?;
//!     server
//!         .run(registry, handle.commands(), config.outbound_capacity)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connections;
pub mod control_mode;
pub mod driver;
pub mod error;
pub mod game;
pub mod input_router;
pub mod network;
pub mod physics;
pub mod policy;
pub mod session;
