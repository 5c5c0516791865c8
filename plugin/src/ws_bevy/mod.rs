//! WebSocket Bevy Plugin
//!
//! Provides Bevy integration for the WebSocket client.
//! This plugin owns the connection as a Bevy resource and delivers
//! transport events once per frame.

mod plugin;

pub use plugin::{SocketPlugin, SocketPluginConfig, SocketResource, poll_socket_events};

// Re-export core socket types for convenience
pub use crate::ws::{ConnectionManager, ConnectionState, SocketConfig, SocketError};
