use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use log::*;
use relay::ConnectionLifecycle;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// WebSocket handler that turns each upgraded connection into a subscriber.
/// Every change event is pushed to it until it disconnects.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !app_state.lifecycle.accepts_origin(origin) {
        warn!("Rejected WebSocket connection from origin {origin:?}");
        return StatusCode::FORBIDDEN.into_response();
    }

    let lifecycle = app_state.lifecycle.clone();
    let ping_interval = app_state.config.ws_ping_interval();
    ws.on_upgrade(move |socket| handle_socket(socket, lifecycle, ping_interval))
}

async fn handle_socket(mut socket: WebSocket, lifecycle: ConnectionLifecycle, ping_interval: Duration) {
    let (handle, mut rx) = lifecycle.open_channel();
    let id = handle.id().clone();
    lifecycle.on_open(handle);

    let mut keepalive = time::interval_at(Instant::now() + ping_interval, ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Anything received from the peer since the last ping proves it is alive.
    let mut heard_from_peer = true;

    loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    break;
                };
                if let Err(e) = socket.send(Message::Text(payload.as_ref().into())).await {
                    debug!("Failed to write to subscriber {id}: {e}");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        // The close reply is queued when the peer's frame is read;
                        // this flushes it so the peer sees a clean close.
                        if let Err(e) = socket.send(Message::Close(frame)).await {
                            debug!("Subscriber {id} closed before the close reply was sent: {e}");
                        }
                        break;
                    }
                    None => break,
                    // Subscribers have nothing to say; any frame, Pong included, counts as liveness.
                    Some(Ok(_)) => heard_from_peer = true,
                    Some(Err(e)) => {
                        debug!("Subscriber {id} connection error: {e}");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if !heard_from_peer {
                    info!("Subscriber {id} did not answer the last ping, disconnecting");
                    break;
                }
                heard_from_peer = false;
                if let Err(e) = socket.send(Message::Ping(Default::default())).await {
                    debug!("Failed to ping subscriber {id}: {e}");
                    break;
                }
            }
        }
    }

    // Connection closed, clean up
    lifecycle.on_close(&id);
}
