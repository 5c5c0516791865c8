//! WebSocket Bevy Plugin Implementation

use bevy::prelude::*;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::ws::{ConnectionManager, SocketConfig, Transport, TungsteniteTransport};

/// Configuration for the WebSocket plugin.
pub struct SocketPluginConfig {
    /// Address to connect to while the plugin is built.
    address: Option<String>,
    socket: SocketConfig,
    /// Transport override (wrapped for interior mutability).
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl Default for SocketPluginConfig {
    fn default() -> Self {
        Self {
            address: None,
            socket: SocketConfig::default(),
            transport: Mutex::new(None),
        }
    }
}

impl SocketPluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to `address` as soon as the plugin is added.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_socket_config(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    /// Use a custom transport instead of tokio-tungstenite.
    pub fn with_transport(self, transport: impl Transport) -> Self {
        let transport: Box<dyn Transport> = Box::new(transport);
        if let Ok(mut guard) = self.transport.lock() {
            *guard = Some(transport);
        }
        self
    }

    /// Take the transport out of the config.
    fn take_transport(&self) -> Box<dyn Transport> {
        self.transport
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .unwrap_or_else(|| Box::new(TungsteniteTransport::new()) as Box<dyn Transport>)
    }
}

/// Bevy Resource wrapper for ConnectionManager.
///
/// This keeps the ws module free of Bevy dependencies.
#[derive(Resource)]
pub struct SocketResource(ConnectionManager);

impl SocketResource {
    /// Get the inner ConnectionManager.
    pub fn inner(&self) -> &ConnectionManager {
        &self.0
    }
}

impl Deref for SocketResource {
    type Target = ConnectionManager;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SocketResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Bevy plugin for a polled WebSocket connection.
///
/// This plugin:
/// - Inserts `SocketResource` for systems to connect, send and receive
/// - Optionally connects to a configured address right away
/// - Delivers transport events in `PreUpdate`, so state and messages are current in `Update`
///
/// ## Usage
///
/// ```ignore
/// App::new()
///     .add_plugins(SocketPlugin::new(
///         SocketPluginConfig::new().with_address("ws://localhost:8091"),
///     ))
///     .run();
/// ```
pub struct SocketPlugin {
    config: SocketPluginConfig,
}

impl SocketPlugin {
    pub fn new(config: SocketPluginConfig) -> Self {
        Self { config }
    }
}

impl Plugin for SocketPlugin {
    fn build(&self, app: &mut App) {
        let transport = self.config.take_transport();
        let mut manager =
            ConnectionManager::with_boxed_transport(transport, self.config.socket.clone())
                .unwrap_or_else(|e| panic!("Invalid WebSocket plugin config: {}", e));

        if let Some(address) = &self.config.address {
            log::info!("Connecting WebSocket to {}", address);
            manager.connect(address.clone());
        }

        app.insert_resource(SocketResource(manager));
        app.add_systems(PreUpdate, poll_socket_events);

        log::info!("WebSocket plugin configured");
    }
}

/// Deliver pending transport events each frame.
pub fn poll_socket_events(socket: Option<ResMut<SocketResource>>) {
    if let Some(mut socket) = socket {
        let handled = socket.poll_events();
        if handled > 0 {
            log::trace!("Handled {} WebSocket event(s)", handled);
        }
    }
}
