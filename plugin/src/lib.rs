//! # Polled WebSocket client for Bevy
//!
//! Connect asynchronously, send binary frames, and drain received messages
//! from a per-frame update without blocking.
//!
//! ## Example
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_ws_client::{SocketPlugin, SocketPluginConfig, SocketResource};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(SocketPlugin::new(
//!             SocketPluginConfig::new().with_address("ws://localhost:8091"),
//!         ))
//!         .add_systems(Update, network)
//!         .run();
//! }
//!
//! fn network(mut socket: ResMut<SocketResource>) {
//!     if !socket.is_connected() {
//!         return;
//!     }
//!     while let Some(message) = socket.try_recv() {
//!         info!("received {} bytes", message.len());
//!     }
//! }
//! ```

pub mod ws;
pub mod ws_bevy;

pub use ws::{
    CloseFrame, ConnectionManager, ConnectionState, OverflowPolicy, SocketConfig, SocketError,
    Transport, TungsteniteTransport,
};
pub use ws_bevy::{SocketPlugin, SocketPluginConfig, SocketResource};
