use thiserror::Error;

/// Errors returned synchronously by [`ConnectionManager`](super::ConnectionManager).
///
/// Connection failures are not reported here: they show up as the
/// `Errored`/`Closed` state and through `last_error()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// A frame was sent while the connection was not open.
    #[error("WebSocket is not open")]
    NotConnected,

    /// The background transport task has already stopped.
    #[error("WebSocket transport has shut down")]
    ChannelClosed,

    #[error("Invalid socket config: {0}")]
    InvalidConfig(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}
