//! Wire protocol for client connections.
//!
//! Every frame on the socket, in either direction, is a JSON object of shape
//! `{"event": <name>, "data": <object>}`. Inbound frames are decoded into
//! [`ClientFrame`] and dispatched here; the replies (zero or more
//! [`ServerFrame`]s) are pushed through the connection's outbound channel by
//! the caller, so per-connection ordering follows the inbound order.
//!
//! Built-in events are matched first, then `request:dashboard:<domain>` by
//! prefix, then the custom handler table. Unknown events are logged and
//! ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::dashboard::build_dashboard;
use crate::extensions::HandlerContext;
use crate::hub::EventHub;
use crate::types::{ConnectionId, Principal, PrincipalDomain, TopicKind};

// ============================================================================
// Event names
// ============================================================================

/// Inbound: authenticate this connection with a bearer token.
pub const EVENT_AUTHENTICATE: &str = "authenticate";
/// Inbound: subscribe to a monitor's status updates and alerts.
pub const EVENT_SUBSCRIBE_MONITOR: &str = "subscribe:monitor";
/// Inbound: drop a monitor subscription.
pub const EVENT_UNSUBSCRIBE_MONITOR: &str = "unsubscribe:monitor";
/// Inbound: subscribe to a website's alerts.
pub const EVENT_SUBSCRIBE_WEBSITE: &str = "subscribe:website";
/// Inbound: drop a website subscription.
pub const EVENT_UNSUBSCRIBE_WEBSITE: &str = "unsubscribe:website";
/// Inbound prefix: request a dashboard snapshot for a domain.
pub const DASHBOARD_REQUEST_PREFIX: &str = "request:dashboard:";

/// Outbound: authentication succeeded.
pub const EVENT_AUTH_SUCCESS: &str = "auth:success";
/// Outbound: authentication failed.
pub const EVENT_AUTH_ERROR: &str = "auth:error";
/// Outbound: generic request error (e.g. unauthenticated dashboard request).
pub const EVENT_ERROR: &str = "error";
/// Outbound push: a monitor's status changed.
pub const EVENT_MONITOR_STATUS_UPDATE: &str = "monitor:status:update";
/// Outbound push: a monitor raised an alert.
pub const EVENT_MONITOR_ALERT: &str = "monitor:alert";
/// Outbound push: an alert re-tagged with the owning website.
pub const EVENT_WEBSITE_ALERT: &str = "website:alert";

/// Returns `true` for event names claimed by the built-in protocol.
///
/// Custom handlers may not shadow these.
#[must_use]
pub fn is_reserved_event(name: &str) -> bool {
    matches!(
        name,
        EVENT_AUTHENTICATE
            | EVENT_SUBSCRIBE_MONITOR
            | EVENT_UNSUBSCRIBE_MONITOR
            | EVENT_SUBSCRIBE_WEBSITE
            | EVENT_UNSUBSCRIBE_WEBSITE
    ) || name.starts_with(DASHBOARD_REQUEST_PREFIX)
}

// ============================================================================
// Frames
// ============================================================================

/// An inbound frame from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// An outbound frame to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Shorthand for an error-shaped frame: `{event, data: {"error": …}}`.
    #[must_use]
    pub fn error(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event, json!({ "error": message.into() }))
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handles one inbound frame for a connection, returning the frames to send
/// back on that connection (in order).
///
/// `principal` is the connection's authentication state, owned by the
/// connection's actor; a successful `authenticate` updates it in place.
pub async fn dispatch(
    hub: &EventHub,
    connection_id: ConnectionId,
    principal: &mut Option<Principal>,
    frame: ClientFrame,
) -> Vec<ServerFrame> {
    match frame.event.as_str() {
        EVENT_AUTHENTICATE => handle_authenticate(hub, connection_id, principal, &frame.data),
        EVENT_SUBSCRIBE_MONITOR | EVENT_UNSUBSCRIBE_MONITOR => handle_subscription(
            hub,
            connection_id,
            &frame.event,
            TopicKind::Monitor,
            &frame.data,
        ),
        EVENT_SUBSCRIBE_WEBSITE | EVENT_UNSUBSCRIBE_WEBSITE => handle_subscription(
            hub,
            connection_id,
            &frame.event,
            TopicKind::Website,
            &frame.data,
        ),
        other => {
            if let Some(domain_name) = other.strip_prefix(DASHBOARD_REQUEST_PREFIX) {
                if let Some(domain) = PrincipalDomain::parse(domain_name) {
                    return handle_dashboard_request(hub, principal, domain).await;
                }
            }
            handle_custom_event(hub, connection_id, principal, frame).await
        }
    }
}

fn handle_authenticate(
    hub: &EventHub,
    connection_id: ConnectionId,
    principal: &mut Option<Principal>,
    data: &Value,
) -> Vec<ServerFrame> {
    let token = match data.get("token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => token,
        _ => return vec![ServerFrame::error(EVENT_AUTH_ERROR, "missing token")],
    };

    match hub.resolver().authenticate(token) {
        Ok(resolved) => {
            hub.registry()
                .register(resolved.domain, resolved.id.clone(), connection_id);
            let reply = ServerFrame::new(
                EVENT_AUTH_SUCCESS,
                json!({ "domain": resolved.domain, "id": resolved.id.clone() }),
            );
            *principal = Some(resolved);
            vec![reply]
        }
        Err(err) => {
            debug!(connection_id = %connection_id, error = %err, "Authentication failed");
            vec![ServerFrame::error(EVENT_AUTH_ERROR, err.to_string())]
        }
    }
}

fn handle_subscription(
    hub: &EventHub,
    connection_id: ConnectionId,
    event: &str,
    kind: TopicKind,
    data: &Value,
) -> Vec<ServerFrame> {
    let field = match kind {
        TopicKind::Monitor => "monitorId",
        TopicKind::Website => "websiteId",
    };

    let topic_id = match data.get(field).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id,
        _ => {
            // Validation failure: reply and leave the index untouched.
            return vec![ServerFrame::error(
                format!("{event}:error"),
                format!("missing required field '{field}'"),
            )];
        }
    };

    let message = if event.starts_with("subscribe") {
        hub.subscriptions().subscribe(kind, topic_id, connection_id);
        format!("subscribed to {kind} {topic_id}")
    } else {
        hub.subscriptions()
            .unsubscribe(kind, topic_id, connection_id);
        format!("unsubscribed from {kind} {topic_id}")
    };

    let mut data = serde_json::Map::new();
    data.insert(field.to_string(), Value::String(topic_id.to_string()));
    data.insert("message".to_string(), Value::String(message));

    vec![ServerFrame::new(format!("{event}:success"), Value::Object(data))]
}

async fn handle_dashboard_request(
    hub: &EventHub,
    principal: &Option<Principal>,
    domain: PrincipalDomain,
) -> Vec<ServerFrame> {
    // The caller must already be authenticated in the requested domain.
    let principal = match principal {
        Some(p) if p.domain == domain => p,
        _ => return vec![ServerFrame::error(EVENT_ERROR, "authentication required")],
    };

    match build_dashboard(hub.store(), domain, &principal.id).await {
        Ok(snapshot) => match serde_json::to_value(&snapshot) {
            Ok(data) => vec![ServerFrame::new(format!("dashboard:{domain}"), data)],
            Err(err) => {
                warn!(error = %err, "Failed to serialize dashboard snapshot");
                vec![ServerFrame::error(EVENT_ERROR, "dashboard unavailable")]
            }
        },
        Err(err) => {
            warn!(
                domain = %domain,
                principal_id = %principal.id,
                error = %err,
                "Dashboard assembly failed"
            );
            vec![ServerFrame::error(EVENT_ERROR, "dashboard unavailable")]
        }
    }
}

async fn handle_custom_event(
    hub: &EventHub,
    connection_id: ConnectionId,
    principal: &Option<Principal>,
    frame: ClientFrame,
) -> Vec<ServerFrame> {
    let Some(handler) = hub.handlers().get(&frame.event) else {
        debug!(event = %frame.event, "Ignoring unknown event");
        return Vec::new();
    };

    let ctx = HandlerContext {
        connection_id,
        principal: principal.clone(),
    };

    match handler(frame.data, ctx).await {
        Ok(result) => vec![ServerFrame::new(format!("{}:result", frame.event), result)],
        Err(reason) => vec![ServerFrame::error(
            format!("{}:error", frame.event),
            reason,
        )],
    }
}
