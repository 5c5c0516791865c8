/// WebSocket ready states (matching browser API)
pub const WS_CONNECTING: u32 = 0;
pub const WS_OPEN: u32 = 1;
pub const WS_CLOSING: u32 = 2;
pub const WS_CLOSED: u32 = 3;

/// Lifecycle of the connection owned by a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection has been requested yet.
    #[default]
    Disconnected,
    /// `connect` was called and the handshake has not completed.
    Connecting,
    /// The handshake completed; frames can be sent.
    Open,
    /// The peer or the caller closed the connection.
    Closed,
    /// The transport failed, either while connecting or mid-session.
    Errored,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// True once the connection can no longer reach (or return to) `Open`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }

    /// Browser-style `readyState` value.
    pub fn ready_state(self) -> u32 {
        match self {
            ConnectionState::Connecting => WS_CONNECTING,
            ConnectionState::Open => WS_OPEN,
            ConnectionState::Disconnected | ConnectionState::Closed | ConnectionState::Errored => {
                WS_CLOSED
            }
        }
    }
}

/// Close code and reason reported by the peer (or synthesized for local closes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub const NORMAL: u16 = 1000;
    pub const ABNORMAL: u16 = 1006;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}
