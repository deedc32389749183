//! HTTP server assembly: shared state, router, and REST handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use duologue_core::RoomId;
use duologue_rooms::{ConnectionRegistry, SessionCoordinator};
use duologue_store::{ChatStore, RoomRow};

use crate::config::ServerConfig;
use crate::health;
use crate::shutdown::ShutdownCoordinator;
use crate::ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub coordinator: Arc<SessionCoordinator>,
    pub store: Arc<ChatStore>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub metrics: PrometheusHandle,
    pub config: Arc<ServerConfig>,
}

/// The assembled server: owns the state and builds the router.
pub struct DuologueServer {
    state: AppState,
}

impl DuologueServer {
    pub fn new(config: ServerConfig, store: ChatStore, metrics: PrometheusHandle) -> Self {
        let store = Arc::new(store);
        let registry = Arc::new(ConnectionRegistry::new());
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            config.coordinator_config(),
        ));
        let state = AppState {
            registry,
            coordinator,
            store,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
            config: Arc::new(config),
        };
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.state.shutdown)
    }

    /// Build the full route table.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/rooms", post(create_room))
            .route("/api/rooms/{room_id}", get(get_room))
            .route("/api/sessions/ws/{room_id}", get(ws::ws_handler))
            .with_state(self.state.clone())
    }
}

// ─── REST payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub couple_id: i64,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room_id: String,
    pub room_name: String,
    pub couple_id: i64,
    pub created_at: String,
    pub is_existing: bool,
}

impl RoomResponse {
    fn from_row(row: RoomRow, is_existing: bool) -> Self {
        Self {
            room_id: row.id,
            room_name: row.name,
            couple_id: row.couple_id,
            created_at: row.created_at,
            is_existing,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Response {
    let sessions = match state.store.open_session_count() {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "health check store query failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable");
        }
    };
    let resp = health::health_check(
        state.start_time,
        state.registry.connection_count(),
        sessions,
    );
    Json(resp).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Response {
    match state.store.create_room(&req.room_name, req.couple_id) {
        Ok((room, existed)) => {
            info!(
                room_id = %room.id,
                couple_id = req.couple_id,
                user_id = %req.user_id,
                reused = existed,
                "room requested"
            );
            Json(RoomResponse::from_row(room, existed)).into_response()
        }
        Err(e) => {
            error!(couple_id = req.couple_id, error = %e, "room creation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create room")
        }
    }
}

async fn get_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    let room = RoomId::from(room_id);
    match state.store.get_room(&room) {
        Ok(Some(row)) => Json(RoomResponse::from_row(row, true)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "room not found"),
        Err(e) => {
            error!(room_id = %room, error = %e, "room lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load room")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_server() -> DuologueServer {
        let store = ChatStore::in_memory().unwrap();
        DuologueServer::new(ServerConfig::default(), store, crate::metrics::test_handle())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = test_server().router();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let app = test_server().router();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = test_server().router();
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_room_then_fetch() {
        let server = test_server();

        let response = server
            .router()
            .oneshot(
                Request::post("/api/rooms")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"room_name":"our room","couple_id":7,"user_id":"42"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["room_name"], "our room");
        assert_eq!(created["is_existing"], false);
        let room_id = created["room_id"].as_str().unwrap().to_owned();
        assert!(room_id.starts_with("room_"));

        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/rooms/{room_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = body_json(response).await;
        assert_eq!(fetched["room_id"], room_id.as_str());
        assert_eq!(fetched["couple_id"], 7);
    }

    #[tokio::test]
    async fn create_room_reuses_active_room_for_couple() {
        let server = test_server();
        let body = r#"{"room_name":"r","couple_id":3,"user_id":"1"}"#;

        let first = body_json(
            server
                .router()
                .oneshot(
                    Request::post("/api/rooms")
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            server
                .router()
                .oneshot(
                    Request::post("/api/rooms")
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(first["is_existing"], false);
        assert_eq!(second["is_existing"], true);
        assert_eq!(second["room_id"], first["room_id"]);
    }

    #[tokio::test]
    async fn unknown_room_is_404() {
        let app = test_server().router();
        let response = app
            .oneshot(
                Request::get("/api/rooms/room_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "room not found");
    }

    #[tokio::test]
    async fn websocket_route_requires_upgrade_handshake() {
        // A plain GET never reaches the handler; the upgrade extractor
        // rejects it first. Token rejection itself is covered by the auth
        // module's tests.
        let app = test_server().router();
        let response = app
            .oneshot(
                Request::get("/api/sessions/ws/room_x?token=not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }
}
