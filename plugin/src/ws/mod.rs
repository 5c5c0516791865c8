//! WebSocket Client Module
//!
//! A single polled WebSocket connection backed by tokio-tungstenite.
//! No Bevy dependencies - this can be used standalone from any loop
//! that calls `poll_events` / `try_recv` once per frame.

mod config;
mod error;
mod event;
pub mod host;
mod manager;
mod queue;
mod state;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{OverflowPolicy, SocketConfig};
pub use error::SocketError;
pub use event::{
    ConnectionId, EventSink, FrameSender, Outbound, OutboundReceiver, TransportEvent,
    outbound_channel,
};
pub use manager::ConnectionManager;
pub use queue::{InboundQueue, PushOutcome};
pub use state::*;
pub use transport::{OpenRequest, Transport, TungsteniteTransport};
