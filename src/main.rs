use feed::{Backoff, ChangeFeed, PgChangeSource};
use log::*;
use relay::{BroadcastDispatcher, ConnectionLifecycle, SubscriberRegistry};
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = service::provision_feed_table(&config).await {
        error!("Failed to provision the change feed table: {e}");
        std::process::exit(1);
    }

    let registry = Arc::new(SubscriberRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
    let lifecycle = ConnectionLifecycle::new(Arc::clone(&registry));

    let listener = match TcpListener::bind(config.listen_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", config.listen_addr());
            std::process::exit(1);
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let source = PgChangeSource::new(config.database_url(), config.feed_channel.clone())
        .with_connect_timeout(config.db_connect_timeout());
    let feed = ChangeFeed::new(source, dispatcher).with_backoff(Backoff::new(
        config.feed_retry_base_delay(),
        config.feed_retry_max_delay(),
    ));
    let mut feed_shutdown = shutdown_tx.subscribe();
    let feed_handle = tokio::spawn(feed.run_until(async move {
        feed_shutdown.recv().await.ok();
    }));

    let mut server_shutdown = shutdown_tx.subscribe();
    let app_state = web::AppState::new(config, lifecycle);
    let server_handle = tokio::spawn(web::serve(listener, app_state, async move {
        server_shutdown.recv().await.ok();
        info!("WebSocket server shutting down");
    }));

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match server_handle.await {
        Ok(Err(e)) => error!("WebSocket server failed: {e}"),
        Err(e) => error!("WebSocket server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = feed_handle.await {
        error!("Change feed task failed: {e}");
    }

    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, initiating shutdown"),
        _ = terminate => info!("SIGTERM received, initiating shutdown"),
    }
}
