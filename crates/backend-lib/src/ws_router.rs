// ============================
// munch-backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use munch_common::{ClientToServer, ServerToClient};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::AppError;
use crate::gateway::Connection;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::registry::RoomId;
use crate::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.cors_origin);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/new-room-id", get(new_room_id))
        .route("/api/check-room-id", post(check_room_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any),
        Err(_) => {
            warn!(origin, "invalid CORS origin in config; browsers will be refused");
            CorsLayer::new()
        },
    }
}

#[derive(Serialize)]
struct RoomIdResponse {
    #[serde(rename = "roomId")]
    room_id: RoomId,
}

#[derive(Deserialize)]
struct RoomIdRequest {
    #[serde(rename = "roomId")]
    room_id: String,
}

#[derive(Serialize)]
struct CheckRoomIdResponse {
    message: &'static str,
}

/// Allocate a fresh room code for a client about to create a room.
async fn new_room_id(State(state): State<Arc<AppState>>) -> Result<Json<RoomIdResponse>, AppError> {
    let room_id = state.registry.allocate_id()?;
    Ok(Json(RoomIdResponse { room_id }))
}

/// Pre-join validation: does this code name a live room?
async fn check_room_id(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RoomIdRequest>,
) -> impl IntoResponse {
    let valid = state
        .registry
        .normalize_id(&request.room_id)
        .map(|room_id| state.registry.exists(&room_id))
        .unwrap_or(false);

    if valid {
        (StatusCode::OK, Json(CheckRoomIdResponse { message: "valid" }))
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(CheckRoomIdResponse { message: "invalid" }),
        )
    }
}

/// Handler for WebSocket connections
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(WS_CONNECTION).increment(1);
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    gauge!(WS_ACTIVE).increment(1.0);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // outbound channel: both direct replies and room fan-out go through it
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerToClient>(32);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    error!(error = %err, "failed to serialize outbound message");
                    continue;
                },
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection::new(state, outbound_tx.clone());

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<ClientToServer>(&text) {
                    Ok(msg) => match conn.handle_message(msg).await {
                        Ok(Some(reply)) => Some(reply),
                        Ok(None) => None,
                        Err(err) => Some(ServerToClient::Error {
                            code: err.error_code().to_string(),
                            message: err.client_message(),
                        }),
                    },
                    Err(err) => Some(ServerToClient::MalformedMessage {
                        err_msg: err.to_string(),
                    }),
                };

                if let Some(reply) = reply {
                    if outbound_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    // cleanup: retract membership and reconcile the registry whether the
    // client closed cleanly or the socket just died
    conn.disconnect().await;

    gauge!(WS_ACTIVE).decrement(1.0);
    send_task.abort();
}
