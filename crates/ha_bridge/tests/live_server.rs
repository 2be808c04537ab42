//! End-to-end tests against a local axum server speaking the backend's
//! REST and WebSocket endpoints.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use ha_bridge::Bridge;
use ha_bridge::BridgeConfig;
use ha_bridge::BridgeError;
use ha_bridge::ConnectionState;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);
const TOKEN: &str = "secret";

async fn states(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_none_or(|v| v == format!("Bearer {}", TOKEN));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "light.living_room": {
            "state": "on",
            "attributes": {"brightness": 255, "friendly_name": "Living Room"},
            "last_updated": "2024-02-02T12:00:00Z"
        },
        "switch.kitchen": {
            "state": "off",
            "attributes": {},
            "last_updated": "2024-02-02T12:00:00Z"
        }
    }))
    .into_response()
}

async fn actions() -> Json<serde_json::Value> {
    Json(json!({
        "light.turn_on": {
            "domain": "light",
            "name": "turn_on",
            "description": "Turn on light",
            "fields": {
                "brightness": {"name": "Brightness", "required": false}
            },
            "id": "light.turn_on"
        }
    }))
}

async fn broken_actions() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn events(upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(stream_changes)
}

async fn stream_changes(mut socket: WebSocket) {
    let frames = [
        json!({"type": "ping"}).to_string(),
        "garbage".to_string(),
        json!({
            "type": "state_changed",
            "entity_id": "light.living_room",
            "state": {
                "state": "off",
                "attributes": {"friendly_name": "Living Room"},
                "last_updated": "2024-02-02T12:01:00Z"
            }
        })
        .to_string(),
    ];
    for frame in frames {
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    // Hold the stream open until the client leaves
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn backend() -> SocketAddr {
    spawn_server(
        Router::new()
            .route("/api/states", get(states))
            .route("/api/actions", get(actions))
            .route("/ws", get(events)),
    )
    .await
}

#[tokio::test]
async fn test_live_change_reports_previous_state() {
    let addr = backend().await;
    let bridge = Bridge::from_config(&BridgeConfig::new(format!("http://{}", addr))).unwrap();
    let mut changes = bridge.subscribe();

    tokio::time::timeout(WAIT, bridge.connect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bridge.connection_state(), ConnectionState::Open);
    assert_eq!(bridge.get_state("switch.kitchen").unwrap().state, "off");
    assert_eq!(bridge.get_state("missing.entity"), None);

    let change = tokio::time::timeout(WAIT, changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.entity_id, "light.living_room");
    assert_eq!(change.new_state.state, "off");
    assert_eq!(change.old_state.unwrap().state, "on");
    assert_eq!(bridge.get_state("light.living_room").unwrap().state, "off");

    bridge.disconnect();
    assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_get_all_states_with_token() {
    let addr = backend().await;
    let mut config = BridgeConfig::new(format!("http://{}", addr));
    config.access_token = Some(TOKEN.to_string());
    let bridge = Bridge::from_config(&config).unwrap();

    let states = tokio::time::timeout(WAIT, bridge.get_all_states())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(states.len(), 2);
    assert_eq!(
        states["light.living_room"].friendly_name(),
        Some("Living Room")
    );
    assert_eq!(
        bridge.entity_ids(Some("switch")),
        vec!["switch.kitchen".to_string()]
    );
    bridge.disconnect();
}

#[tokio::test]
async fn test_rejected_token_fails_connect() {
    let addr = backend().await;
    let mut config = BridgeConfig::new(format!("http://{}", addr));
    config.access_token = Some("wrong".to_string());
    let bridge = Bridge::from_config(&config).unwrap();

    let err = tokio::time::timeout(WAIT, bridge.connect())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to fetch states: 401");
    assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);
    assert!(bridge.reconnect_pending());
    bridge.disconnect();
    assert!(!bridge.reconnect_pending());
}

#[tokio::test]
async fn test_get_actions() {
    let addr = backend().await;
    let bridge = Bridge::from_config(&BridgeConfig::new(format!("http://{}", addr))).unwrap();

    let catalog = bridge.get_actions().await.unwrap();

    let turn_on = &catalog["light.turn_on"];
    assert_eq!(turn_on.domain.as_deref(), Some("light"));
    assert_eq!(turn_on.description.as_deref(), Some("Turn on light"));
    assert_eq!(turn_on.fields["brightness"].required, Some(false));
    assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_get_actions_failure_includes_status_and_body() {
    let addr = spawn_server(Router::new().route("/api/actions", get(broken_actions))).await;
    let bridge = Bridge::from_config(&BridgeConfig::new(format!("http://{}", addr))).unwrap();

    let err = bridge.get_actions().await.unwrap_err();

    assert!(matches!(
        err,
        BridgeError::FetchFailed { status: 500, .. }
    ));
    assert!(err.to_string().contains("500"));
    assert_eq!(
        err.to_string(),
        "Failed to fetch actions: 500 Internal Server Error"
    );
}

#[tokio::test]
async fn test_unreachable_backend_rejects_connect() {
    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bridge = Bridge::from_config(&BridgeConfig::new(format!("http://{}", addr))).unwrap();
    let err = tokio::time::timeout(WAIT, bridge.connect())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, BridgeError::Transport(_)));
    bridge.disconnect();
}
