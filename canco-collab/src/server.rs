//! HTTP and WebSocket server with path-based room routing.
//!
//! ```text
//! GET  /ping               ──► {"message":"pong"}
//! POST /api/createRoom     ──► RoomRegistry::get_or_create ──► {message, roomID}
//! GET  /api/join/{room}    ──► upgrade ──► Room::try_add_user(outbound channel)
//! GET  /{room}                                       │
//!                         ┌──────────────────────────┴───────────┐
//!                         ▼                                      ▼
//!              ConnectionHandler::run                     write_outbound
//!              (socket → room)                            (channel → socket)
//! ```
//!
//! Both halves of a connection run until either side stops; the user is
//! then removed from its room.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::broadcast::outbound_channel;
use crate::connection::{write_outbound, ConnectionHandler, MessageCounters};
use crate::error::CollabError;
use crate::registry::RoomRegistry;
use crate::room::Room;

/// Path prefix for room connections; `/{room}` is accepted as well.
pub const JOIN_PATH_PREFIX: &str = "/api/join/";

/// Close reason sent when a room filled up during the upgrade.
const ROOM_FULL: &str = "room is full";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Messages buffered per connection before the oldest is dropped
    pub outbound_capacity: usize,
    /// Time budget for a single socket write
    pub write_timeout_ms: u64,
    /// Connections refused once a room holds this many users
    pub max_users_per_room: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            outbound_capacity: 256,
            write_timeout_ms: 5_000,
            max_users_per_room: 100,
        }
    }
}

impl ServerConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub rejected_messages: u64,
    pub active_rooms: usize,
}

#[derive(Default)]
struct ConnectionCounters {
    total: AtomicU64,
    active: AtomicU64,
}

/// Shared by every handler.
#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    registry: Arc<RoomRegistry>,
    connections: Arc<ConnectionCounters>,
    messages: Arc<MessageCounters>,
}

#[derive(Debug, Serialize)]
struct Pong {
    message: &'static str,
}

/// Body of `POST /api/createRoom`. Without a `roomID` a fresh id is minted.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(rename = "roomID", default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RoomCreated {
    message: &'static str,
    #[serde(rename = "roomID")]
    room_id: String,
}

/// The canvas server.
pub struct SyncServer {
    state: AppState,
}

impl SyncServer {
    /// Create a server with its own, empty registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::new()))
    }

    /// Create a server routing into an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<RoomRegistry>) -> Self {
        Self {
            state: AppState {
                config: Arc::new(config),
                registry,
                connections: Arc::new(ConnectionCounters::default()),
                messages: Arc::new(MessageCounters::default()),
            },
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.state.registry
    }

    /// Create (or fetch) a room ahead of any connection.
    pub async fn create_room(&self, room_id: &str) -> Arc<Room> {
        self.state.registry.get_or_create(room_id).await
    }

    /// All routes, bound to this server's registry and counters.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ping", get(ping))
            .route("/api/createRoom", post(create_room))
            .route("/api/join/:room_id", get(join_room))
            .route("/:room_id", get(join_room))
            .fallback(not_found)
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), CollabError> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        log::info!("Canvas server listening on {}", self.state.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), CollabError> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Snapshot of server-wide counters.
    pub async fn stats(&self) -> ServerStats {
        let state = &self.state;
        ServerStats {
            total_connections: state.connections.total.load(Ordering::Relaxed),
            active_connections: state.connections.active.load(Ordering::Relaxed),
            total_messages: state.messages.messages.load(Ordering::Relaxed),
            total_bytes: state.messages.bytes.load(Ordering::Relaxed),
            rejected_messages: state.messages.rejected.load(Ordering::Relaxed),
            active_rooms: state.registry.room_count().await,
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.state.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

async fn ping() -> Json<Pong> {
    Json(Pong { message: "pong" })
}

async fn create_room(
    State(state): State<AppState>,
    body: Option<Json<CreateRoomRequest>>,
) -> Json<RoomCreated> {
    let requested = body.and_then(|Json(request)| request.room_id);
    let room_id = match requested {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };

    let room = state.registry.get_or_create(&room_id).await;
    log::info!("Room {} created over HTTP", room.id());
    Json(RoomCreated {
        message: "Room created",
        room_id,
    })
}

async fn not_found(uri: Uri) -> (StatusCode, String) {
    log::warn!("No route for {}", uri.path());
    (StatusCode::NOT_FOUND, format!("no room at {}", uri.path()))
}

async fn join_room(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let room = state.registry.get_or_create(&room_id).await;
    if room.user_count().await >= state.config.max_users_per_room {
        log::warn!("Refusing upgrade to full room {room_id}");
        return (StatusCode::SERVICE_UNAVAILABLE, ROOM_FULL).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, room, state))
}

async fn handle_socket(mut socket: WebSocket, room: Arc<Room>, state: AppState) {
    let room_id = room.id().to_string();
    let config = &state.config;
    let (outbound_tx, outbound_rx) = outbound_channel(config.outbound_capacity);

    // Another upgrade may have taken the last seat since the pre-check
    let Some(user) = room
        .try_add_user(outbound_tx, config.max_users_per_room)
        .await
    else {
        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: Cow::from(ROOM_FULL),
        };
        if let Err(e) = socket.send(Message::Close(Some(frame))).await {
            log::debug!("Could not send close to refused peer in room {room_id}: {e}");
        }
        return;
    };

    state.connections.total.fetch_add(1, Ordering::Relaxed);
    state.connections.active.fetch_add(1, Ordering::Relaxed);
    log::info!("User {} connected to room {room_id}", user.id);

    let (ws_sender, ws_receiver) = socket.split();
    let mut writer = tokio::spawn(write_outbound(
        outbound_rx,
        ws_sender,
        config.write_timeout(),
        room.clone(),
        user.id,
    ));

    let handler =
        ConnectionHandler::new(room.clone(), user.id).with_counters(state.messages.clone());
    tokio::select! {
        summary = handler.run(ws_receiver) => {
            log::debug!("Reader for user {} in room {room_id} finished: {summary:?}", user.id);
            if let Err(e) = (&mut writer).await {
                log::error!("Writer task for user {} in room {room_id} panicked: {e}", user.id);
            }
        }
        result = &mut writer => {
            if let Err(e) = result {
                log::error!("Writer task for user {} in room {room_id} panicked: {e}", user.id);
            }
            log::info!("Dropping user {} in room {room_id}: outbound stream stopped", user.id);
        }
    }

    // No-op if the reader already deregistered
    room.remove_user(user.id).await;
    state.connections.active.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_room_request(body: Body, json: bool) -> Request<Body> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/createRoom");
        if json {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        request.body(body).unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_users_per_room, 100);
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            outbound_capacity: 8,
            write_timeout_ms: 250,
            max_users_per_room: 2,
        };
        let server = SyncServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(server.config().write_timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_ping() {
        let server = SyncServer::with_defaults();
        let response = server
            .router()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn test_create_room_with_requested_id() {
        let server = SyncServer::with_defaults();
        let response = server
            .router()
            .oneshot(create_room_request(Body::from(r#"{"roomID":"r7"}"#), true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "message": "Room created", "roomID": "r7" })
        );
        assert!(server.registry().get("r7").await.is_some());
    }

    #[tokio::test]
    async fn test_create_room_without_body_mints_id() {
        let server = SyncServer::with_defaults();
        let response = server
            .router()
            .oneshot(create_room_request(Body::empty(), false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let room_id = body["roomID"].as_str().unwrap();
        assert!(Uuid::parse_str(room_id).is_ok());
        assert!(server.registry().get(room_id).await.is_some());
    }

    #[tokio::test]
    async fn test_create_room_is_idempotent() {
        let server = SyncServer::with_defaults();
        for _ in 0..2 {
            server
                .router()
                .oneshot(create_room_request(Body::from(r#"{"roomID":"r1"}"#), true))
                .await
                .unwrap();
        }

        assert_eq!(server.registry().room_count().await, 1);
        assert_eq!(server.registry().rooms_created(), 1);
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let server = SyncServer::with_defaults();
        for path in ["/a/b/c", "/api/join/", "/"] {
            let response = server
                .router()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
        assert_eq!(server.registry().room_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_without_upgrade_rejected() {
        let server = SyncServer::with_defaults();
        let response = server
            .router()
            .oneshot(Request::get("/api/join/r1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(server.registry().room_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.stats().await, ServerStats::default());
    }

    #[tokio::test]
    async fn test_create_room_uses_shared_registry() {
        let registry = Arc::new(RoomRegistry::new());
        let server = SyncServer::with_registry(ServerConfig::default(), registry.clone());

        let room = server.create_room("r1").await;
        let again = registry.get_or_create("r1").await;

        assert!(Arc::ptr_eq(&room, &again));
        assert_eq!(server.stats().await.active_rooms, 1);
    }
}
