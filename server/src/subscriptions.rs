//! Subscription index: which connections care about which topics.
//!
//! Two independent many-to-many membership tables, one per topic kind
//! (monitor and website), each mapping a topic id to the set of subscribed
//! connection ids. Membership is a set, not a multiset: subscribing twice is
//! a no-op. A topic entry exists in a table if and only if it has at least
//! one subscriber — emptied entries are deleted, so idle topics cost nothing.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::trace;

use crate::types::{ConnectionId, TopicKind};

type TopicTable = DashMap<String, HashSet<ConnectionId>>;

/// Membership tables for monitor and website subscriptions.
#[derive(Default)]
pub struct SubscriptionIndex {
    monitors: TopicTable,
    websites: TopicTable,
}

impl SubscriptionIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: TopicKind) -> &TopicTable {
        match kind {
            TopicKind::Monitor => &self.monitors,
            TopicKind::Website => &self.websites,
        }
    }

    /// Adds a connection to a topic's subscriber set, creating the set if
    /// absent. Returns `true` if the connection was newly added, `false` if
    /// it was already subscribed (idempotent).
    pub fn subscribe(&self, kind: TopicKind, topic_id: &str, connection_id: ConnectionId) -> bool {
        let added = self
            .table(kind)
            .entry(topic_id.to_string())
            .or_default()
            .insert(connection_id);
        trace!(
            kind = %kind,
            topic_id = %topic_id,
            connection_id = %connection_id,
            added,
            "Subscribe"
        );
        added
    }

    /// Removes a connection from a topic's subscriber set; deletes the topic
    /// entry if the set becomes empty. Unknown topics and non-subscribers
    /// are no-ops.
    pub fn unsubscribe(&self, kind: TopicKind, topic_id: &str, connection_id: ConnectionId) {
        let table = self.table(kind);

        let became_empty = match table.get_mut(topic_id) {
            Some(mut subscribers) => {
                subscribers.remove(&connection_id);
                subscribers.is_empty()
            }
            None => false,
        };

        // Guard dropped above; re-check emptiness under the removal lock so a
        // racing subscribe cannot be wiped out.
        if became_empty {
            table.remove_if(topic_id, |_, subscribers| subscribers.is_empty());
        }
    }

    /// Removes a connection from every topic of both kinds, deleting topic
    /// entries that become empty. Called exactly once per disconnect.
    pub fn purge_connection(&self, connection_id: ConnectionId) {
        for table in [&self.monitors, &self.websites] {
            table.retain(|_, subscribers| {
                subscribers.remove(&connection_id);
                !subscribers.is_empty()
            });
        }
        trace!(connection_id = %connection_id, "Purged connection from subscription index");
    }

    /// Returns the current subscribers of a topic (possibly empty).
    #[must_use]
    pub fn subscribers_of(&self, kind: TopicKind, topic_id: &str) -> Vec<ConnectionId> {
        self.table(kind)
            .get(topic_id)
            .map(|subscribers| subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the topic has an entry (i.e. at least one subscriber).
    #[must_use]
    pub fn contains_topic(&self, kind: TopicKind, topic_id: &str) -> bool {
        self.table(kind).contains_key(topic_id)
    }

    /// Number of topics of the given kind with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self, kind: TopicKind) -> usize {
        self.table(kind).len()
    }
}

impl std::fmt::Debug for SubscriptionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionIndex")
            .field("monitor_topics", &self.monitors.len())
            .field("website_topics", &self.websites.len())
            .finish()
    }
}
