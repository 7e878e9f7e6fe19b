//! Custom protocol extension point.
//!
//! Operators embedding the hub can register additional named request/response
//! handlers at any time, before or after the server starts. The registry is
//! a single process-wide table consulted at dispatch time, so a registration
//! is instantly visible to every already-open connection and to every
//! connection accepted afterwards — no per-connection attachment
//! bookkeeping exists to get out of sync.
//!
//! A handler receives the inbound frame's `data` plus a [`HandlerContext`]
//! describing the calling connection. Its `Ok` value is sent back as
//! `<name>:result`; its `Err` string as `<name>:error`. Re-registering a
//! name replaces the previous handler wholesale, so an event is never
//! double-handled.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::protocol::is_reserved_event;
use crate::types::{ConnectionId, Principal};

/// What a custom handler returns: a reply payload or a failure reason.
pub type HandlerResult = std::result::Result<Value, String>;

/// Boxed future produced by a custom handler invocation.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// A registered handler, callable from any connection's dispatch loop.
pub type CustomHandler = Arc<dyn Fn(Value, HandlerContext) -> HandlerFuture + Send + Sync>;

/// Per-invocation context handed to custom handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The connection the event arrived on.
    pub connection_id: ConnectionId,

    /// The connection's authentication state at dispatch time, if any.
    pub principal: Option<Principal>,
}

/// Process-wide table of custom event handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, CustomHandler>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `name`.
    ///
    /// Unusable registrations — an empty name, or a name already claimed by
    /// the built-in protocol — are logged and ignored rather than failing,
    /// so a bad plugin cannot take the server down.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = name.into();

        if name.is_empty() {
            warn!("Ignoring custom handler registration with an empty event name");
            return;
        }

        if is_reserved_event(&name) {
            warn!(
                event = %name,
                "Ignoring custom handler registration for a reserved event name"
            );
            return;
        }

        let boxed: CustomHandler =
            Arc::new(move |payload, ctx| -> HandlerFuture { Box::pin(handler(payload, ctx)) });

        if self.handlers.insert(name.clone(), boxed).is_some() {
            warn!(event = %name, "Replaced existing custom handler");
        }
    }

    /// Looks up the handler for an event name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CustomHandler> {
        self.handlers.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Returns `true` if a handler is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
