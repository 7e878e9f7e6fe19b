//! Connection registry for live WebSocket clients.
//!
//! Two maps with distinct jobs:
//!
//! - [`ConnectionMap`] owns the handle of every live connection
//!   (connection id → outbound sender), from transport-level accept to
//!   transport-level disconnect. The broadcaster consults it to decide
//!   whether a subscription entry still points at a live connection.
//! - [`ConnectionRegistry`] maps authenticated principals
//!   (domain + principal id → connection id), so "is principal X online"
//!   is a single map lookup. Entries appear on successful authentication
//!   and are removed on disconnect.
//!
//! Both are DashMap-backed: every operation is one atomic map operation, so
//! concurrent register/unregister for different connections need no external
//! lock.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::ServerFrame;
use crate::types::{ConnectionId, Principal, PrincipalDomain};

/// Sender half of a connection's outbound channel.
///
/// Any component holding a clone can push frames to that client; the
/// connection's writer task drains the receiver into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<ServerFrame>;

/// Live connection handles, keyed by connection id.
#[derive(Default)]
pub struct ConnectionMap {
    inner: DashMap<ConnectionId, ConnectionSender>,
}

impl ConnectionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted connection.
    pub fn insert(&self, connection_id: ConnectionId, sender: ConnectionSender) {
        self.inner.insert(connection_id, sender);
        debug!(connection_id = %connection_id, live = self.len(), "Connection attached");
    }

    /// Removes a connection's handle. Idempotent.
    pub fn remove(&self, connection_id: ConnectionId) -> Option<ConnectionSender> {
        let removed = self.inner.remove(&connection_id).map(|(_, sender)| sender);
        if removed.is_some() {
            debug!(connection_id = %connection_id, live = self.len(), "Connection detached");
        }
        removed
    }

    /// Returns a clone of the connection's sender, if it is still live.
    #[must_use]
    pub fn sender(&self, connection_id: ConnectionId) -> Option<ConnectionSender> {
        self.inner.get(&connection_id).map(|s| s.clone())
    }

    /// Returns `true` if the connection is still live.
    #[must_use]
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.inner.contains_key(&connection_id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ConnectionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMap")
            .field("connections", &self.len())
            .finish()
    }
}

/// Maps authenticated principals to their live connection.
///
/// A principal has at most one live connection per domain: registration is
/// last-write-wins, so a second authentication for the same `(domain, id)`
/// silently overwrites the previous mapping. The evicted connection stays
/// open and is cleaned up normally on its own disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: DashMap<Principal, ConnectionId>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `connection_id` as the live connection for a principal,
    /// overwriting any prior mapping. Always succeeds.
    pub fn register(
        &self,
        domain: PrincipalDomain,
        principal_id: impl Into<String>,
        connection_id: ConnectionId,
    ) {
        let principal = Principal::new(domain, principal_id);
        let previous = self.inner.insert(principal.clone(), connection_id);

        if let Some(previous) = previous.filter(|prev| *prev != connection_id) {
            // Last-write-wins: the earlier connection keeps running but no
            // longer resolves from this principal.
            debug!(
                domain = %principal.domain,
                principal_id = %principal.id,
                evicted_connection = %previous,
                connection_id = %connection_id,
                "Re-authentication replaced principal mapping"
            );
        } else {
            debug!(
                domain = %principal.domain,
                principal_id = %principal.id,
                connection_id = %connection_id,
                "Principal registered"
            );
        }
    }

    /// Removes any entry, in any domain, that maps to `connection_id`.
    ///
    /// Idempotent: unknown ids and repeated calls are no-ops.
    pub fn unregister_connection(&self, connection_id: ConnectionId) {
        self.inner.retain(|_, mapped| *mapped != connection_id);
    }

    /// Looks up the live connection for a principal.
    #[must_use]
    pub fn lookup(&self, domain: PrincipalDomain, principal_id: &str) -> Option<ConnectionId> {
        self.inner
            .get(&Principal::new(domain, principal_id))
            .map(|entry| *entry)
    }

    /// Number of registered principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("principals", &self.len())
            .finish()
    }
}
