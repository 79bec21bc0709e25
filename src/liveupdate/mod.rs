//! WebSocket Fanout (C6).
//!
//! Accepts anonymous WebSocket clients, keeps them alive with pings, and
//! forwards every message from the durable `liveupdate` queue to each live
//! client — standardized on forwarding only the envelope's `data` field
//! (`spec.md §9`'s WebSocket-framing open question).

pub mod registry;

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::broker::topology::{
    bind_queue, declare_durable_queue, declare_fanout_exchange, LIVEUPDATE_QUEUE,
    MESSAGES_POST_EXCHANGE,
};
use crate::broker::BrokerGateway;
use crate::envelope::Envelope;

pub use registry::ConnectionRegistry;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const PONG_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(registry: ConnectionRegistry) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(registry): State<ConnectionRegistry>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(socket: WebSocket, registry: ConnectionRegistry) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let conn_id = Uuid::new_v4();
    registry.add(conn_id, tx.clone()).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            match message {
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let ping_tx = tx;
    let mut ping_task = tokio::spawn(async move {
        loop {
            if ping_tx.send(Message::Ping(Vec::new())).is_err() {
                break;
            }
            match tokio::time::timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => break,
            }
            tokio::time::sleep(PING_INTERVAL).await;
        }
    });

    tokio::select! {
        _ = &mut send_task => { ping_task.abort(); recv_task.abort(); }
        _ = &mut recv_task => { ping_task.abort(); send_task.abort(); }
        _ = &mut ping_task => { send_task.abort(); recv_task.abort(); }
    }

    registry.remove(conn_id).await;
}

/// Declare the shared topology and consume `liveupdate` for the life of the
/// process, fanning each message's `data` field out to every live client.
pub async fn run_consumer(
    gateway: &BrokerGateway,
    registry: ConnectionRegistry,
) -> Result<(), lapin::Error> {
    let channel = gateway.channel().await?;
    declare_fanout_exchange(&channel, MESSAGES_POST_EXCHANGE).await?;
    declare_durable_queue(&channel, LIVEUPDATE_QUEUE).await?;
    bind_queue(&channel, LIVEUPDATE_QUEUE, MESSAGES_POST_EXCHANGE, "").await?;

    let mut consumer = channel
        .basic_consume(
            LIVEUPDATE_QUEUE,
            "liveupdate",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!("waiting for messages...");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(error) => {
                tracing::warn!(%error, "liveupdate consumer stream error, stopping");
                break;
            }
        };

        if let Ok(envelope) = serde_json::from_slice::<Envelope>(&delivery.data) {
            if let Some(data) = envelope.data {
                if let Ok(json) = serde_json::to_string(&data) {
                    registry.broadcast(&json).await;
                }
            }
        }

        if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
            tracing::warn!(%error, "failed to ack liveupdate delivery");
        }
    }

    Ok(())
}
