//! Transport seam and the tokio-tungstenite implementation.
//!
//! A transport owns the actual socket. It runs off the host thread, reports
//! what happens through an [`EventSink`] and writes whatever frames arrive on
//! its [`OutboundReceiver`]. When the manager drops its end of the outbound
//! channel the transport closes the socket and stops, even mid-handshake.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::ws::{CloseFrame, ConnectionId, EventSink, Outbound, OutboundReceiver, SocketConfig};

/// Everything a transport needs to run one connection.
pub struct OpenRequest {
    pub id: ConnectionId,
    pub address: String,
    pub config: SocketConfig,
    pub events: EventSink,
    pub outbound: OutboundReceiver,
}

/// Opens connections on behalf of a [`ConnectionManager`](super::ConnectionManager).
///
/// `open` must return immediately. Address validation belongs to the
/// transport and is reported asynchronously as an error event.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, request: OpenRequest);
}

/// Static Tokio runtime for hosts that don't run one (e.g. the Bevy main loop).
pub(crate) static TOKIO: once_cell::sync::Lazy<tokio::runtime::Runtime> =
    once_cell::sync::Lazy::new(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("ws-transport")
            .build()
            .expect("Failed to create WebSocket runtime")
    });

/// WebSocket transport backed by tokio-tungstenite.
pub struct TungsteniteTransport {
    runtime: Handle,
}

impl TungsteniteTransport {
    /// Use the ambient tokio runtime if there is one, otherwise a shared background runtime.
    pub fn new() -> Self {
        let runtime = Handle::try_current().unwrap_or_else(|_| TOKIO.handle().clone());
        Self { runtime }
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, request: OpenRequest) {
        self.runtime.spawn(run_connection(request));
    }
}

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to hang up after answering its close frame.
const CLOSE_LINGER: Duration = Duration::from_secs(1);

async fn run_connection(request: OpenRequest) {
    let OpenRequest {
        id,
        address,
        config,
        events,
        mut outbound,
    } = request;

    log::info!("[WebSocket {}] Connecting to {}", id, address);

    let established = tokio::select! {
        biased;
        result = establish(id, &address, &config) => result,
        () = abandoned(&mut outbound) => {
            log::info!("[WebSocket {}] Abandoned during handshake", id);
            return;
        }
    };

    let ws_stream = match established {
        Ok(stream) => stream,
        Err(message) => {
            log::error!("[WebSocket {}] {}", id, message);
            events.error(message);
            events.closed(CloseFrame::new(CloseFrame::ABNORMAL, "Connection failed"));
            return;
        }
    };

    events.open();

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let message = match frame {
                    Some(Outbound::Binary(data)) => Message::binary(data),
                    Some(Outbound::Text(text)) => Message::text(text),
                    // Closed explicitly, or the manager let go of this connection.
                    Some(Outbound::Close) | None => {
                        log::info!("[WebSocket {}] Closing", id);
                        if let Err(e) = write.send(Message::Close(None)).await {
                            log::debug!("[WebSocket {}] Close frame not sent: {}", id, e);
                        }
                        break;
                    }
                };
                if let Err(e) = write.send(message).await {
                    log::error!("[WebSocket {}] Send error: {}", id, e);
                    events.error(format!("Send failed: {}", e));
                    events.closed(CloseFrame::new(CloseFrame::ABNORMAL, "Connection error"));
                    break;
                }
            }
            received = read.next() => match received {
                Some(Ok(Message::Binary(data))) => {
                    log::debug!("[WebSocket {}] Received binary ({} bytes)", id, data.len());
                    events.message(data.to_vec());
                }
                Some(Ok(Message::Text(text))) => {
                    log::debug!("[WebSocket {}] Received text ({} bytes)", id, text.len());
                    events.message(text.as_str().as_bytes().to_vec());
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Handled by tungstenite
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((CloseFrame::NORMAL, String::new()));
                    log::info!("[WebSocket {}] Received close: {} {}", id, code, reason);
                    events.closed(CloseFrame::new(code, reason));
                    finish_close(id, &mut write, &mut read).await;
                    break;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    log::error!("[WebSocket {}] Read error: {}", id, e);
                    events.error(e.to_string());
                    events.closed(CloseFrame::new(CloseFrame::ABNORMAL, "Connection error"));
                    break;
                }
                None => {
                    log::warn!("[WebSocket {}] Stream ended without a close frame", id);
                    events.closed(CloseFrame::new(CloseFrame::ABNORMAL, "Connection lost"));
                    break;
                }
            }
        }
    }

    log::info!("[WebSocket {}] Connection ended", id);
}

/// Resolves once the manager closes or lets go of the connection.
async fn abandoned(outbound: &mut OutboundReceiver) {
    // The manager only queues data frames after the open event, so nothing is lost here.
    while let Some(frame) = outbound.recv().await {
        if frame == Outbound::Close {
            return;
        }
    }
}

/// Send the close reply tungstenite queued, then wait for the peer to hang up.
async fn finish_close(
    id: ConnectionId,
    write: &mut SplitSink<Stream, Message>,
    read: &mut SplitStream<Stream>,
) {
    if let Err(e) = write.flush().await {
        log::debug!("[WebSocket {}] Close reply not flushed: {}", id, e);
    }
    let drained = tokio::time::timeout(CLOSE_LINGER, async {
        while let Some(Ok(_)) = read.next().await {}
    })
    .await;
    if drained.is_err() {
        log::debug!("[WebSocket {}] Peer kept the socket open after closing", id);
    }
}

/// Validate the address, then run TCP connect and the WebSocket handshake.
async fn establish(id: ConnectionId, address: &str, config: &SocketConfig) -> Result<Stream, String> {
    let url = url::Url::parse(address).map_err(|e| format!("Invalid URL: {}", e))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!("Unsupported URL scheme: {}", url.scheme()));
    }

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("Failed to create request: {}", e))?;

    if let Some(origin) = &config.origin {
        let value = origin
            .parse::<HeaderValue>()
            .map_err(|e| format!("Invalid Origin header: {}", e))?;
        request.headers_mut().insert("Origin", value);
    }

    if !config.protocols.is_empty() {
        let value = config
            .protocols
            .join(", ")
            .parse::<HeaderValue>()
            .map_err(|e| format!("Invalid Sec-WebSocket-Protocol header: {}", e))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    log::info!("[WebSocket {}] Performing WebSocket handshake", id);

    let handshake = tokio_tungstenite::connect_async_with_config(request, None, config.nodelay);
    let result = match config.connect_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| format!("Connection timed out after {} ms", timeout.as_millis()))?,
        None => handshake.await,
    };

    let (stream, response) = result.map_err(|e| format!("Handshake failed: {}", e))?;
    log::info!(
        "[WebSocket {}] Connected successfully (status: {})",
        id,
        response.status()
    );
    Ok(stream)
}
