//! WebSocket listener that turns every upgraded connection into a subscriber.

use axum::serve::ListenerExt;
use log::*;
use relay::ConnectionLifecycle;
use service::config::Config;
use std::future::Future;
use tokio::net::TcpListener;

mod controller;
pub mod router;
mod ws;

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub lifecycle: ConnectionLifecycle,
}

impl AppState {
    pub fn new(config: Config, lifecycle: ConnectionLifecycle) -> Self {
        Self { config, lifecycle }
    }
}

/// Serve WebSocket subscribers on `listener` until `shutdown` resolves.
///
/// Every accepted socket has Nagle's algorithm disabled: notifications are
/// small, single messages and should leave as soon as they are queued.
pub async fn serve<F>(listener: TcpListener, app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(
        "Started WebSocket server at {}{}",
        local_addr, app_state.config.ws_path
    );

    let listener = listener.tap_io(|tcp| {
        if let Err(e) = tcp.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on incoming connection: {e}");
        }
    });

    axum::serve(listener, router::define_routes(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}
