use futures_util::{SinkExt, StreamExt};
use lobby_core::{Config, GatewayConfig};
use lobby_gateway::{GatewayBroadcaster, GatewayServer, MethodHandlers};
use lobby_presence::{InMemoryStore, PresenceRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_gateway() -> String {
    let broadcaster = GatewayBroadcaster::new(64);
    let registry = PresenceRegistry::from_config(
        Arc::new(InMemoryStore::new()),
        Some(Arc::new(broadcaster.clone())),
        &Config::default(),
    );
    let handlers = Arc::new(MethodHandlers::new(registry, broadcaster.clone()));
    let server = GatewayServer::new(GatewayConfig::default(), handlers, broadcaster);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    format!("ws://{}/hubs/lobby", addr)
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

fn request(id: &str, method: &str, params: Value) -> Message {
    let frame = json!({"type": "req", "data": {"id": id, "method": method, "params": params}});
    Message::Text(frame.to_string().into())
}

#[tokio::test]
async fn smoke_connect_emits_event_to_subscriber() {
    let url = spawn_gateway().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "res");
    assert_eq!(hello["data"]["id"], "hello");
    assert_eq!(hello["data"]["payload"]["policy"]["requireTenantSubscription"], true);

    ws.send(request("s1", "presence.subscribe", json!({"tenantId": "acme"})))
        .await
        .unwrap();
    let subscribed = next_json(&mut ws).await;
    assert_eq!(subscribed["data"]["ok"], true);

    ws.send(request(
        "c1",
        "presence.connect",
        json!({"tenantId": "acme", "playerId": "p1", "name": "Alice"}),
    ))
    .await
    .unwrap();

    let mut saw_response = false;
    let mut saw_event = false;
    while !(saw_response && saw_event) {
        let frame = next_json(&mut ws).await;
        match frame["type"].as_str() {
            Some("res") => {
                assert_eq!(frame["data"]["id"], "c1");
                assert_eq!(frame["data"]["payload"]["state"], "Online");
                saw_response = true;
            }
            Some("event") => {
                assert_eq!(frame["data"]["event"], "presence.online");
                assert_eq!(frame["data"]["payload"]["playerId"], "p1");
                saw_event = true;
            }
            other => panic!("unexpected frame type {:?}", other),
        }
    }

    ws.send(request("l1", "presence.list", json!({"tenantId": "acme"})))
        .await
        .unwrap();
    let listing = next_json(&mut ws).await;
    assert_eq!(listing["data"]["payload"]["onlinePlayers"], json!(["p1"]));
    assert_eq!(listing["data"]["payload"]["count"], 1);
}

#[tokio::test]
async fn smoke_unsubscribed_connection_sees_no_tenant_events() {
    let url = spawn_gateway().await;
    let (mut watcher, _) = tokio_tungstenite::connect_async(url.clone()).await.unwrap();
    let (mut actor, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    next_json(&mut watcher).await;
    next_json(&mut actor).await;

    actor
        .send(request(
            "c1",
            "presence.connect",
            json!({"tenantId": "acme", "playerId": "p1"}),
        ))
        .await
        .unwrap();
    next_json(&mut actor).await;

    // A push is delivered to everyone, and it must be the first thing the watcher sees
    actor
        .send(request("p1", "lobby.push", json!({"message": "hello lobby"})))
        .await
        .unwrap();

    let frame = next_json(&mut watcher).await;
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["data"]["event"], "TestMessage");
    assert_eq!(frame["data"]["payload"], "hello lobby");
}

#[tokio::test]
async fn smoke_wrong_path_is_rejected() {
    let url = spawn_gateway().await;
    let wrong = url.replace("/hubs/lobby", "/nope");
    assert!(tokio_tungstenite::connect_async(wrong).await.is_err());
}
