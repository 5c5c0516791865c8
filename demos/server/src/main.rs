//! Position relay for the `demo` app.
//!
//! Every client sees one shared position. A client moves it by sending a
//! binary JSON frame `{"x": f32, "y": f32}`. Every 100 ms each client is sent
//! the current position as `{"x": f32, "y": f32, "id": u32}`, where `id` is
//! the client that moved it last (ids are handed out per connection, from 0).
//!
//! ```text
//! cargo run -p demo-server            # listens on 0.0.0.0:8091
//! cargo run -p demo-server -- 0.0.0.0:9000
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Serialize)]
struct SharedPosition {
    x: f32,
    y: f32,
    id: u32,
}

#[derive(Debug, Deserialize)]
struct MoveTo {
    x: f32,
    y: f32,
}

#[derive(Default)]
struct World {
    position: Mutex<Option<SharedPosition>>,
    next_id: AtomicU32,
}

impl World {
    fn snapshot(&self) -> SharedPosition {
        let position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        position.unwrap_or(SharedPosition {
            x: 0.0,
            y: 0.0,
            id: 0,
        })
    }

    fn move_to(&self, id: u32, target: MoveTo) {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        *position = Some(SharedPosition {
            x: target.x,
            y: target.y,
            id,
        });
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo_server=info".into()),
        )
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:8091".to_string());
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on ws://{}", listener.local_addr()?);

    let world = Arc::new(World::default());
    loop {
        let (stream, peer) = listener.accept().await?;
        let id = world.next_id.fetch_add(1, Ordering::Relaxed);
        info!("Client {} connected from {}", id, peer);

        let world = world.clone();
        tokio::spawn(async move {
            serve_client(id, stream, world).await;
            info!("Client {} disconnected", id);
        });
    }
}

async fn serve_client(id: u32, stream: TcpStream, world: Arc<World>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Client {} handshake failed: {}", id, e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let mut ticker = interval(BROADCAST_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = match serde_json::to_vec(&world.snapshot()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode position: {}", e);
                        continue;
                    }
                };
                if write.send(Message::binary(payload)).await.is_err() {
                    break;
                }
            }
            received = read.next() => match received {
                Some(Ok(message)) if message.is_binary() || message.is_text() => {
                    match serde_json::from_slice::<MoveTo>(&message.into_data()) {
                        Ok(target) => world.move_to(id, target),
                        Err(e) => warn!("Client {} sent an invalid move: {}", id, e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Client {} read error: {}", id, e);
                    break;
                }
            }
        }
    }
}
