//! End-to-end delivery over real WebSocket connections, without a database:
//! events are injected straight into the dispatcher.

use clap::Parser;
use events::ChangeEvent;
use futures_util::{SinkExt, StreamExt};
use relay::{BroadcastDispatcher, ConnectionLifecycle, SubscriberRegistry};
use serde_json::json;
use service::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use web::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    dispatcher: BroadcastDispatcher,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(&[]).await
    }

    async fn start_with(args: &[&str]) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let config = Config::parse_from(
            ["feed_relay", "--ws-path", "/"]
                .into_iter()
                .chain(args.iter().copied()),
        );
        let app_state = AppState::new(config, ConnectionLifecycle::new(Arc::clone(&registry)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(web::serve(listener, app_state, async {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            dispatcher: BroadcastDispatcher::new(Arc::clone(&registry)),
            registry,
            _shutdown: shutdown_tx,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    async fn connect(&self) -> Client {
        let (client, _response) = connect_async(self.url()).await.unwrap();
        client
    }

    /// The upgrade response reaches the client before `on_open` runs on the server.
    async fn wait_for_subscribers(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.registry.len() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {expected} subscribers, registry has {}",
                self.registry.len()
            )
        });
    }
}

async fn next_text(client: &mut Client) -> String {
    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("connection ended")
        .unwrap();
    message.to_text().unwrap().to_string()
}

async fn assert_silent(client: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "expected no message, got {next:?}");
}

#[tokio::test]
async fn test_two_subscribers_then_one_leaves() {
    let server = TestServer::start().await;
    let mut s1 = server.connect().await;
    let mut s2 = server.connect().await;
    server.wait_for_subscribers(2).await;

    let insert = ChangeEvent::from_json(&json!({"op": "insert", "id": 42}));
    let report = server.dispatcher.broadcast(&insert);
    assert_eq!(report.delivered, 2);

    assert_eq!(next_text(&mut s1).await, insert.payload());
    assert_eq!(next_text(&mut s2).await, insert.payload());
    assert_silent(&mut s1).await;
    assert_silent(&mut s2).await;

    s2.close(None).await.unwrap();
    server.wait_for_subscribers(1).await;

    let delete = ChangeEvent::from_json(&json!({"op": "delete", "id": 42}));
    server.dispatcher.broadcast(&delete);

    assert_eq!(next_text(&mut s1).await, delete.payload());
}

#[tokio::test]
async fn test_events_arrive_in_broadcast_order() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    server.wait_for_subscribers(1).await;

    for i in 0..50 {
        server.dispatcher.broadcast(&ChangeEvent::new(i.to_string()));
    }

    for i in 0..50 {
        assert_eq!(next_text(&mut client).await, i.to_string());
    }
}

#[tokio::test]
async fn test_dropped_connection_is_deregistered() {
    let server = TestServer::start().await;
    let client = server.connect().await;
    server.wait_for_subscribers(1).await;

    drop(client);

    server.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_broadcast_with_no_subscribers() {
    let server = TestServer::start().await;

    let report = server.dispatcher.broadcast(&ChangeEvent::new("{}"));

    assert_eq!(report.recipients, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_any_origin_is_accepted() {
    let server = TestServer::start().await;
    let mut request = server.url().into_client_request().unwrap();
    request.headers_mut().insert(
        "Origin",
        HeaderValue::from_static("https://somewhere-else.example"),
    );

    let (mut client, _response) = connect_async(request).await.unwrap();
    server.wait_for_subscribers(1).await;

    server.dispatcher.broadcast(&ChangeEvent::new("cross-origin"));
    assert_eq!(next_text(&mut client).await, "cross-origin");
}

#[tokio::test]
async fn test_client_messages_are_ignored() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    server.wait_for_subscribers(1).await;

    client.send(Message::text("hello?")).await.unwrap();
    server.dispatcher.broadcast(&ChangeEvent::new("still here"));

    assert_eq!(next_text(&mut client).await, "still here");
    assert_eq!(server.registry.len(), 1);
}

#[tokio::test]
async fn test_client_close_is_answered_with_close_frame() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    server.wait_for_subscribers(1).await;

    client.close(None).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for the close reply");
    assert!(
        matches!(reply, Some(Ok(Message::Close(_)))),
        "expected a close frame, got {reply:?}"
    );
    server.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_unresponsive_subscriber_is_dropped() {
    let server = TestServer::start_with(&["--ws-ping-interval-ms", "100"]).await;
    // Never polled, so pings are never answered.
    let _client = server.connect().await;
    server.wait_for_subscribers(1).await;

    server.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_responsive_subscriber_survives_keepalive() {
    let server = TestServer::start_with(&["--ws-ping-interval-ms", "100"]).await;
    let mut client = server.connect().await;
    server.wait_for_subscribers(1).await;

    // Reading answers pings; collect text frames on the side.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(Ok(message)) = client.next().await {
            if let Message::Text(text) = message {
                let _ = tx.send(text.as_str().to_string());
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.registry.len(), 1, "a live subscriber must stay registered");

    server.dispatcher.broadcast(&ChangeEvent::new("after pings"));
    let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(text, "after pings");
}
