//! HTTP route handlers for the SitePulse server.
//!
//! Three endpoints:
//!
//! - `GET /ws` - WebSocket endpoint for dashboard clients. No pre-upgrade
//!   authentication: clients authenticate in-band with an `authenticate`
//!   frame, so the connection can stay open and unauthenticated.
//! - `POST /events` - ingest endpoint for the check scheduler, guarded by a
//!   shared publisher token. Each accepted event is fanned out immediately.
//! - `GET /health` - health check with connection count and uptime.
//!
//! # Connection actor
//!
//! Each accepted WebSocket is split into halves: a spawned writer task owns
//! the sink and drains the connection's unbounded channel, while the reader
//! loop below processes inbound frames strictly in arrival order. Handler
//! bodies that touch the data store suspend without blocking any other
//! connection. On any exit path the hub tears down the connection's state
//! exactly once.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::auth::validate_publisher_token;
use crate::config::Config;
use crate::error::HubError;
use crate::hub::EventHub;
use crate::protocol::{dispatch, ClientFrame, ServerFrame, EVENT_ERROR};
use crate::types::{EventKind, Principal};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the scheduler's shared publisher token.
const HEADER_PUBLISHER_TOKEN: &str = "X-Publisher-Token";

/// Maximum body size for event ingestion (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// The event hub owning all realtime state.
    pub hub: Arc<EventHub>,

    /// Server configuration.
    pub config: Arc<Config>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state, building a fresh hub from the config.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the store client cannot be constructed.
    pub fn new(config: Config) -> Result<Self, HubError> {
        let hub = Arc::new(EventHub::new(&config)?);
        Ok(Self::with_hub(config, hub))
    }

    /// Creates application state around an existing hub.
    ///
    /// Useful for tests and for embedders that keep their own handle to the
    /// hub (e.g. to register custom events or trigger broadcasts in-process).
    #[must_use]
    pub fn with_hub(config: Config, hub: Arc<EventHub>) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("hub", &self.hub)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/events", post(post_events))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// ============================================================================
// POST /events - Event Ingestion
// ============================================================================

/// Request body for event ingestion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestPayload {
    monitor_id: String,
    kind: EventKind,
    #[serde(default)]
    payload: Value,
}

/// Response body for accepted events.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Number of connections the event was handed to.
    pub delivered: usize,
}

/// POST /events - Ingest one event from the check scheduler.
///
/// Requires the `X-Publisher-Token` header to match the configured token.
/// `status-update` events fan out to the monitor's subscribers;
/// `alert` events additionally fan out to the owning website's subscribers.
///
/// # Responses
///
/// - `202 Accepted` - Event fanned out; body reports the handed-to count
/// - `400 Bad Request` - Invalid event format
/// - `401 Unauthorized` - Missing or invalid publisher token
async fn post_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let token = match headers
        .get(HEADER_PUBLISHER_TOKEN)
        .and_then(|v| v.to_str().ok())
    {
        Some(token) if !token.is_empty() => token,
        _ => {
            debug!("Missing or empty publisher token header");
            return (
                StatusCode::UNAUTHORIZED,
                Json(
                    ErrorResponse::new("missing X-Publisher-Token header")
                        .with_code("missing_token"),
                ),
            )
                .into_response();
        }
    };

    if validate_publisher_token(token, &state.config.publisher_token).is_err() {
        debug!("Publisher token mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("invalid publisher token").with_code("invalid_token")),
        )
            .into_response();
    }

    let ingest: IngestPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "Failed to parse ingest payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    ErrorResponse::new(format!("invalid event format: {err}"))
                        .with_code("invalid_format"),
                ),
            )
                .into_response();
        }
    };

    let delivered = match ingest.kind {
        EventKind::StatusUpdate => state
            .hub
            .broadcast_monitor_event(&ingest.monitor_id, ingest.payload),
        EventKind::Alert => {
            state
                .hub
                .broadcast_alert(&ingest.monitor_id, ingest.payload)
                .await
        }
    };

    info!(
        monitor_id = %ingest.monitor_id,
        kind = ?ingest.kind,
        delivered,
        "Event accepted and fanned out"
    );

    (StatusCode::ACCEPTED, Json(IngestResponse { delivered })).into_response()
}

// ============================================================================
// GET /ws - WebSocket endpoint
// ============================================================================

/// GET /ws - WebSocket endpoint for dashboard clients.
///
/// The upgrade itself is unauthenticated; clients send an `authenticate`
/// frame once connected. Subscription and dashboard frames are handled per
/// the wire protocol in [`crate::protocol`].
async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.hub))
}

/// Runs the actor for one established WebSocket connection.
async fn handle_websocket(socket: WebSocket, hub: Arc<EventHub>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection_id = hub.attach_connection(tx.clone());
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let mut principal: Option<Principal> = None;

    info!(connection_id = %connection_id, "WebSocket client connected");

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(
                            connection_id = %connection_id,
                            error = %err,
                            "Discarding malformed frame"
                        );
                        let _ = tx.send(ServerFrame::error(EVENT_ERROR, "malformed message"));
                        continue;
                    }
                };

                trace!(
                    connection_id = %connection_id,
                    event = %frame.event,
                    "Dispatching frame"
                );

                for reply in dispatch(&hub, connection_id, &mut principal, frame).await {
                    if tx.send(reply).is_err() {
                        // Writer task has died; the reader will observe the
                        // closed socket shortly.
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!(connection_id = %connection_id, "Client sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                // axum answers pongs automatically
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {
                // Binary and pong frames are ignored
            }
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
    hub.detach_connection(connection_id);

    info!(connection_id = %connection_id, "WebSocket client disconnected");
}

/// Forwards frames from the connection's channel to the WebSocket sink.
async fn writer_task(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerFrame>,
) {
    while let Some(frame) = rx.recv().await {
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                error!(error = %err, "Failed to serialize outbound frame");
            }
        }
    }
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of live WebSocket connections.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.hub.connections().len(),
        uptime_seconds: uptime.as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
