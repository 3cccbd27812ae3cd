//! H5 push channel transport: upgrades to a WebSocket and forwards
//! [`PushEvent`]s as JSON text frames, with an application-level
//! ping/pong liveness check.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/ws",
    responses((status = 101, description = "Switching protocols to a push-event WebSocket")),
    tag = "Push"
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (subscriber_id, mut events) = state.push_channel.subscribe();
    info!(%subscriber_id, "push subscriber connected");

    let mut ping_tick = interval(Duration::from_secs(state.config.push_channel.ping_interval_secs));
    ping_tick.tick().await; // first tick fires immediately; consume it so the cadence starts from connect time
    let mut missed_pongs: u32 = 0;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!(%subscriber_id, "push channel closed");
                    break;
                };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ping_tick.tick() => {
                if awaiting_pong {
                    missed_pongs += 1;
                    if missed_pongs >= state.config.push_channel.missed_pong_limit {
                        warn!(%subscriber_id, missed_pongs, "disconnecting unresponsive push subscriber");
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.push_channel.unsubscribe(subscriber_id);
    info!(%subscriber_id, "push subscriber disconnected");
}
