use std::time::Duration;

use serde::Deserialize;

use crate::ws::SocketError;

/// What to do with an inbound message when the queue is at its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued messages until the new one fits.
    DropOldest,
    /// Keep the queue as is and discard the incoming message.
    #[default]
    DropNewest,
}

/// Connection and queue settings for a [`ConnectionManager`](super::ConnectionManager).
///
/// The defaults give an unbounded queue and a plain handshake with no extra headers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// `Origin` header sent with the handshake request.
    pub origin: Option<String>,
    /// Values for the `Sec-WebSocket-Protocol` header.
    pub protocols: Vec<String>,
    /// Maximum number of queued inbound messages.
    pub max_messages: Option<usize>,
    /// Maximum total payload bytes held by the inbound queue.
    pub max_bytes: Option<usize>,
    pub overflow: OverflowPolicy,
    /// Give up on the TCP connect + handshake after this many milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Disable Nagle's algorithm on the underlying TCP stream.
    pub nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            origin: None,
            protocols: Vec::new(),
            max_messages: None,
            max_bytes: None,
            overflow: OverflowPolicy::default(),
            connect_timeout_ms: None,
            nodelay: true,
        }
    }
}

impl SocketConfig {
    /// Parse a config from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SocketError> {
        let config: SocketConfig =
            serde_json::from_str(json).map_err(|e| SocketError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SocketError> {
        if self.max_messages == Some(0) {
            return Err(SocketError::InvalidConfig(
                "max_messages must be at least 1".to_string(),
            ));
        }
        if self.max_bytes == Some(0) {
            return Err(SocketError::InvalidConfig(
                "max_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn is_bounded(&self) -> bool {
        self.max_messages.is_some() || self.max_bytes.is_some()
    }
}
