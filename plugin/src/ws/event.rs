//! Channels between a running transport and its [`ConnectionManager`](super::ConnectionManager).
//!
//! Events travel transport -> manager over an `std::sync::mpsc` channel and are
//! only handled inside the manager's own calls, on the host thread. Outbound
//! frames travel manager -> transport over a tokio channel so the socket task
//! can await them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;

use tokio::sync::mpsc as async_mpsc;

use crate::ws::{CloseFrame, SocketError, WS_CLOSED, WS_CONNECTING, WS_OPEN};

/// Identifies one `connect` call within a manager. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something the transport observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Open,
    /// One complete inbound frame.
    Message(Vec<u8>),
    /// The connection closed (by the peer, or abnormally).
    Closed(CloseFrame),
    /// The transport failed; usually followed by `Closed`.
    Error(String),
}

/// Transport-side end of the event channel.
///
/// Besides queueing events, the sink writes the connection's ready state
/// straight away, so the manager can answer `is_connected` without polling.
#[derive(Clone)]
pub struct EventSink {
    id: ConnectionId,
    sender: mpsc::Sender<TransportEvent>,
    ready_state: Arc<AtomicU32>,
}

impl EventSink {
    pub fn new(
        id: ConnectionId,
        sender: mpsc::Sender<TransportEvent>,
        ready_state: Arc<AtomicU32>,
    ) -> Self {
        Self {
            id,
            sender,
            ready_state,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Browser-style ready state as last written by this sink.
    pub fn ready_state(&self) -> u32 {
        self.ready_state.load(Ordering::Acquire)
    }

    pub fn open(&self) -> bool {
        // Only a connecting socket can open; a late open after close stays closed.
        let _ = self.ready_state.compare_exchange(
            WS_CONNECTING,
            WS_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.dispatch(TransportEvent::Open)
    }

    pub fn message(&self, data: Vec<u8>) -> bool {
        self.dispatch(TransportEvent::Message(data))
    }

    pub fn closed(&self, frame: CloseFrame) -> bool {
        self.ready_state.store(WS_CLOSED, Ordering::Release);
        self.dispatch(TransportEvent::Closed(frame))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.ready_state.store(WS_CLOSED, Ordering::Release);
        self.dispatch(TransportEvent::Error(message.into()))
    }

    /// Returns false once the manager has stopped listening to this connection.
    fn dispatch(&self, event: TransportEvent) -> bool {
        match self.sender.send(event) {
            Ok(()) => true,
            Err(mpsc::SendError(event)) => {
                log::debug!(
                    "[WebSocket {}] Dropping {} event for abandoned connection",
                    self.id,
                    event_name(&event)
                );
                false
            }
        }
    }
}

fn event_name(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::Open => "open",
        TransportEvent::Message(_) => "message",
        TransportEvent::Closed(_) => "close",
        TransportEvent::Error(_) => "error",
    }
}

/// A frame queued by the manager for the transport to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Binary(Vec<u8>),
    Text(String),
    /// Send a normal close frame and stop.
    Close,
}

pub type OutboundReceiver = async_mpsc::UnboundedReceiver<Outbound>;

/// Manager-side end of the outbound channel.
#[derive(Clone)]
pub struct FrameSender {
    sender: async_mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    pub fn new(sender: async_mpsc::UnboundedSender<Outbound>) -> Self {
        Self { sender }
    }

    pub fn send(&self, frame: Outbound) -> Result<(), SocketError> {
        self.sender
            .send(frame)
            .map_err(|_| SocketError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create the outbound channel for a new connection.
pub fn outbound_channel() -> (FrameSender, OutboundReceiver) {
    let (tx, rx) = async_mpsc::unbounded_channel();
    (FrameSender::new(tx), rx)
}
