//! The event hub: one service object owning all shared state.
//!
//! Rather than module-level globals, the identity resolver, connection
//! table, principal registry, subscription index, custom-handler table, and
//! store client are owned by a single [`EventHub`] constructed at startup
//! and shared via `Arc`. Protocol handlers receive it by reference; tests
//! instantiate isolated hubs.
//!
//! External callers (the check scheduler, embedding code) use the hub's
//! public surface: [`EventHub::broadcast_monitor_event`],
//! [`EventHub::broadcast_alert`], and [`EventHub::register_event`].

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::auth::IdentityResolver;
use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::error::HubError;
use crate::extensions::{HandlerContext, HandlerRegistry, HandlerResult};
use crate::registry::{ConnectionMap, ConnectionRegistry, ConnectionSender};
use crate::store::StoreClient;
use crate::subscriptions::SubscriptionIndex;
use crate::types::ConnectionId;

/// Shared state and services for the realtime layer.
pub struct EventHub {
    resolver: IdentityResolver,
    connections: Arc<ConnectionMap>,
    registry: ConnectionRegistry,
    subscriptions: Arc<SubscriptionIndex>,
    handlers: HandlerRegistry,
    store: Arc<StoreClient>,
    broadcaster: EventBroadcaster,
}

impl EventHub {
    /// Builds a hub from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the store client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, HubError> {
        let store = Arc::new(StoreClient::new(
            config.store_url.clone(),
            config.store_api_key.clone(),
        )?);
        let connections = Arc::new(ConnectionMap::new());
        let subscriptions = Arc::new(SubscriptionIndex::new());
        let broadcaster = EventBroadcaster::new(
            Arc::clone(&connections),
            Arc::clone(&subscriptions),
            Arc::clone(&store),
        );

        Ok(Self {
            resolver: IdentityResolver::new(config),
            connections,
            registry: ConnectionRegistry::new(),
            subscriptions,
            handlers: HandlerRegistry::new(),
            store,
            broadcaster,
        })
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Registers a newly accepted connection and returns its id.
    pub fn attach_connection(&self, sender: ConnectionSender) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.connections.insert(connection_id, sender);
        connection_id
    }

    /// Tears down all state for a disconnected connection: the live handle,
    /// any principal mapping, and every subscription. Idempotent.
    pub fn detach_connection(&self, connection_id: ConnectionId) {
        self.connections.remove(connection_id);
        self.registry.unregister_connection(connection_id);
        self.subscriptions.purge_connection(connection_id);
    }

    // ------------------------------------------------------------------
    // Public API for external callers
    // ------------------------------------------------------------------

    /// See [`EventBroadcaster::broadcast_monitor_event`].
    pub fn broadcast_monitor_event(&self, monitor_id: &str, payload: Value) -> usize {
        self.broadcaster.broadcast_monitor_event(monitor_id, payload)
    }

    /// See [`EventBroadcaster::broadcast_alert`].
    pub async fn broadcast_alert(&self, monitor_id: &str, alert: Value) -> usize {
        self.broadcaster.broadcast_alert(monitor_id, alert).await
    }

    /// Registers a custom request/response handler; see
    /// [`HandlerRegistry::register`]. Applies to current and future
    /// connections alike.
    pub fn register_event<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.register(name, handler);
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[must_use]
    pub fn connections(&self) -> &ConnectionMap {
        &self.connections
    }

    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    #[must_use]
    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    #[must_use]
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("connections", &self.connections.len())
            .field("principals", &self.registry.len())
            .field("custom_handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::types::{PrincipalDomain, TopicKind};

    fn test_config() -> Config {
        Config {
            user_jwt_secret: "user-secret".to_string(),
            contributor_jwt_secret: "contributor-secret".to_string(),
            admin_jwt_secret: "admin-secret".to_string(),
            store_url: "http://127.0.0.1:9".to_string(),
            store_api_key: None,
            publisher_token: "publisher-token".to_string(),
            port: 8080,
        }
    }

    #[tokio::test]
    async fn attach_then_detach_cleans_all_state() {
        let hub = EventHub::new(&test_config()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = hub.attach_connection(tx);
        hub.registry().register(PrincipalDomain::User, "u-1", conn);
        hub.subscriptions().subscribe(TopicKind::Monitor, "m1", conn);
        hub.subscriptions().subscribe(TopicKind::Website, "w1", conn);

        hub.detach_connection(conn);

        assert!(!hub.connections().contains(conn));
        assert_eq!(hub.registry().lookup(PrincipalDomain::User, "u-1"), None);
        assert!(!hub.subscriptions().contains_topic(TopicKind::Monitor, "m1"));
        assert!(!hub.subscriptions().contains_topic(TopicKind::Website, "w1"));
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let hub = EventHub::new(&test_config()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = hub.attach_connection(tx);
        hub.detach_connection(conn);
        hub.detach_connection(conn);

        assert!(hub.connections().is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_hub_attached_connection() {
        let hub = EventHub::new(&test_config()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn = hub.attach_connection(tx);
        hub.subscriptions().subscribe(TopicKind::Monitor, "m1", conn);

        let delivered = hub.broadcast_monitor_event("m1", json!({ "status": "up" }));

        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap().event, "monitor:status:update");
    }

    #[tokio::test]
    async fn register_event_is_visible_through_handlers() {
        let hub = EventHub::new(&test_config()).unwrap();
        hub.register_event("ping", |_p, _c| async move { Ok(json!("pong")) });
        assert!(hub.handlers().contains("ping"));
    }

    #[test]
    fn debug_reports_counts() {
        let hub = EventHub::new(&test_config()).unwrap();
        let debug = format!("{hub:?}");
        assert!(debug.contains("EventHub"));
        assert!(debug.contains("connections"));
    }
}
