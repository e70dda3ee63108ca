//! WebSocket transport for the publication hub

use super::Hub;
use crate::engine::DiscoveryEngine;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};

/// Accept WebSocket subscribers on `listener` until the future is dropped.
///
/// Each subscriber first receives the engine's current host table, then every
/// published event and every relayed message.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<Hub>,
    engine: Arc<DiscoveryEngine>,
) -> Result<()> {
    let local = listener.local_addr().context("Listener has no local address")?;
    tracing::info!("Publishing host table on ws://{}", local);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let hub = hub.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, hub, engine).await {
                tracing::debug!("Subscriber {} closed with error: {:#}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    engine: Arc<DiscoveryEngine>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut sink, mut source) = ws.split();

    let (id, mut frames) = hub.subscribe(|| engine.hosts_frame());
    tracing::info!("Subscriber {} connected from {}", id, peer);

    let writer = async {
        while let Some(frame) = frames.recv().await {
            sink.send(Message::Text(frame)).await?;
        }
        Ok::<_, tungstenite::Error>(())
    };

    let reader = async {
        while let Some(message) = source.next().await {
            match message? {
                Message::Text(text) => {
                    tracing::info!("[{}]: {}", peer, text);
                    hub.relay(&text);
                }
                Message::Binary(bytes) => {
                    hub.relay(&String::from_utf8_lossy(&bytes));
                }
                Message::Close(_) => break,
                // Ping/pong are answered by tungstenite itself
                _ => {}
            }
        }
        Ok::<_, tungstenite::Error>(())
    };

    let result = tokio::select! {
        r = writer => r,
        r = reader => r,
    };

    hub.unsubscribe(id);
    tracing::info!("Subscriber {} from {} disconnected", id, peer);
    result.context("WebSocket connection error")
}
