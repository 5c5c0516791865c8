//! End-to-end tests against a local tokio-tungstenite echo server

use std::time::Duration;

use bevy_ws_client::{CloseFrame, ConnectionManager, ConnectionState, SocketConfig, SocketError};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// Start a server that echoes data frames, closing after `close_after` of them.
async fn echo_server(close_after: Option<usize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut echoed = 0;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() || message.is_text() {
                ws.send(message).await.unwrap();
                echoed += 1;
                if Some(echoed) == close_after {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    });

    format!("ws://{}", addr)
}

/// Accept one TCP connection and never answer its handshake.
async fn stalled_server() -> (String, oneshot::Receiver<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = tx.send(stream);
    });

    (format!("ws://{}", addr), rx)
}

/// True once the client side of `stream` hangs up.
async fn hung_up(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1024];
    let read_to_eof = async {
        while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
    };
    tokio::time::timeout(Duration::from_secs(2), read_to_eof)
        .await
        .is_ok()
}

/// Poll the manager like a frame loop until `done` holds or ~2s pass.
async fn wait_until(
    manager: &mut ConnectionManager,
    mut done: impl FnMut(&mut ConnectionManager) -> bool,
) -> bool {
    for _ in 0..200 {
        manager.poll_events();
        if done(manager) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_pass_through() {
    let address = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();

    socket.connect(address);
    assert!(!socket.is_connected());
    assert_eq!(socket.send(&[1]), Err(SocketError::NotConnected));
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);

    socket.send(&[0x00, 0xFF, 0x10]).unwrap();

    let mut received = None;
    assert!(wait_until(&mut socket, |s| {
        received = s.try_recv();
        received.is_some()
    })
    .await);
    assert_eq!(received, Some(vec![0x00, 0xFF, 0x10]));
    assert_eq!(socket.try_recv(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_order_preserved_over_the_wire() {
    let address = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);

    for i in 0..50u8 {
        socket.send(&[i; 3]).unwrap();
    }

    let mut received = Vec::new();
    assert!(wait_until(&mut socket, |s| {
        while let Some(message) = s.try_recv() {
            received.push(message);
        }
        received.len() >= 50
    })
    .await);

    let expected: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i; 3]).collect();
    assert_eq!(received, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_text_frames_arrive_as_bytes() {
    let address = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);

    socket.send_text("hello").unwrap();

    let mut received = None;
    assert!(wait_until(&mut socket, |s| {
        received = s.try_recv();
        received.is_some()
    })
    .await);
    assert_eq!(received.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_close_is_observed() {
    let address = echo_server(Some(1)).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);

    socket.send(b"last").unwrap();
    assert!(wait_until(&mut socket, |s| s.state() == ConnectionState::Closed).await);

    assert!(!socket.is_connected());
    assert_eq!(socket.close_frame().map(|f| f.code), Some(CloseFrame::NORMAL));
    // The echo sent before the close is still readable.
    assert_eq!(socket.try_recv(), Some(b"last".to_vec()));
    assert_eq!(socket.send(b"more"), Err(SocketError::NotConnected));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refused_connection_never_opens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.state().is_terminal()).await);

    assert_eq!(socket.state(), ConnectionState::Errored);
    assert!(socket.last_error().is_some());
    assert!(!socket.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_address_fails_asynchronously() {
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect("definitely not a url");
    assert_eq!(socket.state(), ConnectionState::Connecting);

    assert!(wait_until(&mut socket, |s| s.state().is_terminal()).await);
    assert_eq!(socket.state(), ConnectionState::Errored);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnect_discards_unread_messages() {
    let first = echo_server(None).await;
    let second = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();

    socket.connect(first);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);
    socket.send(b"stale").unwrap();
    assert!(wait_until(&mut socket, |s| s.pending() > 0).await);

    socket.connect(second);
    assert_eq!(socket.state(), ConnectionState::Connecting);
    assert_eq!(socket.pending(), 0);

    assert!(wait_until(&mut socket, |s| s.is_connected()).await);
    socket.send(b"fresh").unwrap();

    let mut received = None;
    assert!(wait_until(&mut socket, |s| {
        received = s.try_recv();
        received.is_some()
    })
    .await);
    assert_eq!(received, Some(b"fresh".to_vec()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_is_connected_alone_observes_open() {
    let address = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);

    // A host that only ever checks the flag.
    let mut opened = false;
    for _ in 0..200 {
        if socket.is_connected() {
            opened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(opened);
    socket.send(b"ping").unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnect_mid_handshake_releases_socket() {
    let (stalled, accepted) = stalled_server().await;
    let healthy = echo_server(None).await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();

    socket.connect(stalled);
    let mut held = accepted.await.unwrap();
    socket.connect(healthy);

    assert!(hung_up(&mut held).await);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_manager_releases_handshaking_socket() {
    let (stalled, accepted) = stalled_server().await;
    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();

    socket.connect(stalled);
    let mut held = accepted.await.unwrap();
    drop(socket);

    assert!(hung_up(&mut held).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_timeout_fails_the_connection() {
    let (stalled, accepted) = stalled_server().await;
    let config = SocketConfig::default().with_connect_timeout(Duration::from_millis(100));
    let mut socket = ConnectionManager::new(config).unwrap();

    socket.connect(stalled);
    let _held = accepted.await.unwrap();
    assert!(wait_until(&mut socket, |s| s.state().is_terminal()).await);

    assert_eq!(socket.state(), ConnectionState::Errored);
    assert!(socket.last_error().is_some_and(|e| e.contains("timed out")));
    assert_eq!(socket.close_frame().map(|f| f.code), Some(CloseFrame::ABNORMAL));
    assert!(!socket.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_origin_and_protocols_reach_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, headers) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request,
                             mut response: Response|
                             -> Result<Response, ErrorResponse> {
            let header = |name: &str| {
                request
                    .headers()
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            };
            let origin = header("Origin");
            let protocols = header("Sec-WebSocket-Protocol");
            // Agree on the first offered subprotocol, or the client rejects the handshake.
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("game"));
            let _ = tx.send((origin, protocols));
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = SocketConfig::default()
        .with_origin("http://localhost:8080")
        .with_protocol("game")
        .with_protocol("chat");
    let mut socket = ConnectionManager::new(config).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.is_connected()).await);

    let (origin, protocols) = headers.await.unwrap();
    assert_eq!(origin.as_deref(), Some("http://localhost:8080"));
    assert_eq!(protocols.as_deref(), Some("game, chat"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_close_is_answered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, clean) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        // An unanswered close ends in a protocol error instead of end-of-stream.
        let mut answered = true;
        while let Some(result) = ws.next().await {
            if result.is_err() {
                answered = false;
                break;
            }
        }
        let _ = tx.send(answered);
    });

    let mut socket = ConnectionManager::new(SocketConfig::default()).unwrap();
    socket.connect(address);
    assert!(wait_until(&mut socket, |s| s.state() == ConnectionState::Closed).await);

    let answered = tokio::time::timeout(Duration::from_secs(2), clean)
        .await
        .unwrap()
        .unwrap();
    assert!(answered);
}
