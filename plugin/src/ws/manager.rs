//! Connection Manager
//!
//! Owns a single WebSocket connection and bridges its asynchronous events to
//! a host that polls once per frame. Transport events are queued on a channel
//! and applied only inside the manager's own calls, so the host never races
//! with the socket and nothing here blocks. The one exception is the ready
//! state, which the transport writes directly so `is_connected` needs no poll.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ws::{
    CloseFrame, ConnectionId, ConnectionState, EventSink, FrameSender, InboundQueue, OpenRequest,
    Outbound, PushOutcome, SocketConfig, SocketError, Transport, TransportEvent,
    TungsteniteTransport, WS_CONNECTING, WS_OPEN, outbound_channel,
};

/// The live half of a connection as seen from the manager.
struct Connection {
    id: ConnectionId,
    frames: FrameSender,
    ready_state: Arc<AtomicU32>,
    // Only accessed through `get_mut`; the mutex makes the manager `Sync`.
    events: Mutex<Receiver<TransportEvent>>,
}

/// A polled WebSocket client.
///
/// ```no_run
/// use bevy_ws_client::{ConnectionManager, SocketConfig};
///
/// let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
/// socket.connect("ws://localhost:8091");
///
/// // once per frame:
/// socket.poll_events();
/// if socket.is_connected() {
///     socket.send(&[1, 2, 3]).unwrap();
/// }
/// while let Some(message) = socket.try_recv() {
///     println!("{} bytes", message.len());
/// }
/// ```
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    config: SocketConfig,
    next_id: u32,
    connection: Option<Connection>,
    state: ConnectionState,
    queue: InboundQueue,
    last_error: Option<String>,
    close_frame: Option<CloseFrame>,
}

impl ConnectionManager {
    /// Create a manager backed by [`TungsteniteTransport`].
    ///
    /// Fails with [`SocketError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: SocketConfig) -> Result<Self, SocketError> {
        Self::with_transport(TungsteniteTransport::new(), config)
    }

    pub fn with_transport(
        transport: impl Transport,
        config: SocketConfig,
    ) -> Result<Self, SocketError> {
        Self::with_boxed_transport(Box::new(transport), config)
    }

    pub fn with_boxed_transport(
        transport: Box<dyn Transport>,
        config: SocketConfig,
    ) -> Result<Self, SocketError> {
        config.validate()?;
        let queue = InboundQueue::from_config(&config);
        Ok(Self {
            transport,
            config,
            next_id: 0,
            connection: None,
            state: ConnectionState::Disconnected,
            queue,
            last_error: None,
            close_frame: None,
        })
    }

    /// Start connecting to `address` (`ws://` or `wss://`).
    ///
    /// Returns immediately. An existing connection is abandoned and any unread
    /// messages from it are discarded. A bad address is not reported here: the
    /// state moves to `Errored` on a later poll instead of reaching `Open`.
    pub fn connect(&mut self, address: impl Into<String>) {
        let address = address.into();
        self.release();

        self.next_id += 1;
        let id = ConnectionId(self.next_id);

        let (event_tx, event_rx) = mpsc::channel();
        let (frames, outbound) = outbound_channel();
        let ready_state = Arc::new(AtomicU32::new(WS_CONNECTING));

        self.queue = InboundQueue::from_config(&self.config);
        self.state = ConnectionState::Connecting;
        self.last_error = None;
        self.close_frame = None;
        self.connection = Some(Connection {
            id,
            frames,
            ready_state: ready_state.clone(),
            events: Mutex::new(event_rx),
        });

        log::info!("[WebSocket {}] connect({})", id, address);
        self.transport.open(OpenRequest {
            id,
            address,
            config: self.config.clone(),
            events: EventSink::new(id, event_tx, ready_state),
            outbound,
        });
    }

    /// True iff the handshake completed and the connection hasn't closed since.
    ///
    /// Read from the ready state the transport writes, so it turns true as
    /// soon as the handshake completes, with or without a
    /// [`poll_events`](Self::poll_events) in between.
    pub fn is_connected(&self) -> bool {
        self.ready_state() == WS_OPEN
    }

    /// Send `data` as one binary frame.
    pub fn send(&mut self, data: &[u8]) -> Result<(), SocketError> {
        self.send_frame(Outbound::Binary(data.to_vec()))
    }

    /// Send `text` as one text frame.
    pub fn send_text(&mut self, text: &str) -> Result<(), SocketError> {
        self.send_frame(Outbound::Text(text.to_string()))
    }

    /// Encode `value` as JSON and send it as one binary frame.
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), SocketError> {
        let bytes = serde_json::to_vec(value).map_err(|e| SocketError::Encode(e.to_string()))?;
        self.send(&bytes)
    }

    /// Pop the oldest received message, or `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.poll_events();
        self.queue.pop()
    }

    /// Pop the oldest received message and decode it as JSON.
    ///
    /// The message is consumed even if it fails to decode.
    pub fn try_recv_json<T: DeserializeOwned>(&mut self) -> Option<Result<T, SocketError>> {
        let bytes = self.try_recv()?;
        Some(serde_json::from_slice(&bytes).map_err(|e| SocketError::Decode(e.to_string())))
    }

    /// Close the current connection with a normal close frame.
    ///
    /// Messages that already arrived stay readable through `try_recv`.
    pub fn close(&mut self) {
        self.poll_events();
        let Some(connection) = self.connection.take() else {
            return;
        };

        log::info!("[WebSocket {}] close()", connection.id);
        if connection.frames.send(Outbound::Close).is_err() {
            log::debug!("[WebSocket {}] Transport already stopped", connection.id);
        }

        if !self.state.is_terminal() {
            self.state = ConnectionState::Closed;
            self.close_frame = Some(CloseFrame::new(CloseFrame::NORMAL, "Closed by client"));
        }
    }

    /// Apply every transport event that has arrived since the last call.
    ///
    /// Called by `connect`, `send`, `try_recv` and `close`; hosts should also
    /// call it once per frame so `is_connected` stays current. Returns the
    /// number of events handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.next_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Browser-style `readyState` (0 connecting, 1 open, 3 closed).
    pub fn ready_state(&self) -> u32 {
        match &self.connection {
            // A close applied here (explicit, or a vanished transport) wins.
            Some(connection) if !self.state.is_terminal() => {
                connection.ready_state.load(Ordering::Acquire)
            }
            _ => self.state.ready_state(),
        }
    }

    /// The last transport error of the current connection.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// How the current connection closed, if it has.
    pub fn close_frame(&self) -> Option<&CloseFrame> {
        self.close_frame.as_ref()
    }

    /// Number of received messages waiting for `try_recv`.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Messages discarded by the queue bound on the current connection.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub(crate) fn queue(&self) -> &InboundQueue {
        &self.queue
    }

    fn send_frame(&mut self, frame: Outbound) -> Result<(), SocketError> {
        self.poll_events();

        let connection = match (&self.connection, self.state) {
            (Some(connection), ConnectionState::Open) => connection,
            _ => {
                log::warn!("[WebSocket] send while {:?}", self.state);
                return Err(SocketError::NotConnected);
            }
        };

        if let Outbound::Binary(data) = &frame {
            log::debug!("[WebSocket {}] send({} bytes)", connection.id, data.len());
        }
        connection.frames.send(frame)
    }

    fn next_event(&mut self) -> Option<TransportEvent> {
        let connection = self.connection.as_mut()?;
        let receiver = connection
            .events
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        match receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // The transport went away without reporting a close.
                if self.state.is_terminal() {
                    None
                } else {
                    Some(TransportEvent::Closed(CloseFrame::new(
                        CloseFrame::ABNORMAL,
                        "Transport stopped",
                    )))
                }
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let id = self.connection.as_ref().map(|c| c.id).unwrap_or(ConnectionId(0));

        match event {
            TransportEvent::Open => match self.state {
                ConnectionState::Connecting => {
                    log::info!("[WebSocket {}] Open", id);
                    self.state = ConnectionState::Open;
                }
                ConnectionState::Open => {
                    log::debug!("[WebSocket {}] Duplicate open ignored", id);
                }
                state => {
                    log::warn!("[WebSocket {}] Open event ignored while {:?}", id, state);
                }
            },
            TransportEvent::Message(data) => {
                let len = data.len();
                match self.queue.push(data) {
                    PushOutcome::Queued => {}
                    PushOutcome::QueuedAfterEvicting(evicted) => {
                        log::warn!(
                            "[WebSocket {}] Inbound queue full, dropped {} oldest message(s)",
                            id,
                            evicted
                        );
                    }
                    PushOutcome::Rejected => {
                        log::warn!(
                            "[WebSocket {}] Inbound queue full, dropped incoming message ({} bytes)",
                            id,
                            len
                        );
                    }
                }
            }
            TransportEvent::Closed(frame) => {
                log::info!("[WebSocket {}] Closed: {} {}", id, frame.code, frame.reason);
                if self.state != ConnectionState::Errored {
                    self.state = ConnectionState::Closed;
                }
                self.close_frame = Some(frame);
            }
            TransportEvent::Error(message) => {
                log::error!("[WebSocket {}] Error: {}", id, message);
                self.state = ConnectionState::Errored;
                self.last_error = Some(message);
            }
        }
    }

    /// Detach the current connection. Dropping both channel ends stops its
    /// events from reaching us and tells the transport to close the socket.
    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::info!(
                "[WebSocket {}] Abandoned ({} unread message(s))",
                connection.id,
                self.queue.len()
            );
        }
    }
}
