//! Event fan-out to subscribed connections.
//!
//! The broadcaster is the write side of the hub: the check scheduler hands
//! it a monitor id and a payload, and it pushes the payload to every
//! currently connected subscriber of that topic. Delivery is at-most-once
//! and best-effort — a push is attempted once per live connection at
//! broadcast time, with no acknowledgment, retry, or persistence.
//!
//! Subscription entries can briefly outlive their connection (the index is
//! purged on disconnect, which may lag transport-level death detection).
//! The broadcaster tolerates such stale entries by skipping them silently;
//! it never removes them itself.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::{
    ServerFrame, EVENT_MONITOR_ALERT, EVENT_MONITOR_STATUS_UPDATE, EVENT_WEBSITE_ALERT,
};
use crate::registry::ConnectionMap;
use crate::store::StoreClient;
use crate::subscriptions::SubscriptionIndex;
use crate::types::TopicKind;

/// Fans events out to interested live connections.
#[derive(Clone)]
pub struct EventBroadcaster {
    connections: Arc<ConnectionMap>,
    subscriptions: Arc<SubscriptionIndex>,
    store: Arc<StoreClient>,
}

impl EventBroadcaster {
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionMap>,
        subscriptions: Arc<SubscriptionIndex>,
        store: Arc<StoreClient>,
    ) -> Self {
        Self {
            connections,
            subscriptions,
            store,
        }
    }

    /// Broadcasts a status-update payload to a monitor's subscribers.
    ///
    /// Returns the number of connections the payload was handed to — not the
    /// number that actually received it, since delivery over the wire is not
    /// confirmed.
    pub fn broadcast_monitor_event(&self, monitor_id: &str, payload: Value) -> usize {
        let data = tag_payload(&payload, &[("monitorId", monitor_id)]);
        self.fan_out(
            TopicKind::Monitor,
            monitor_id,
            EVENT_MONITOR_STATUS_UPDATE,
            data,
        )
    }

    /// Broadcasts an alert to a monitor's subscribers, then — best-effort —
    /// to the subscribers of the monitor's owning website, re-tagged with
    /// the website id.
    ///
    /// The website lookup goes through the external store. If it fails, the
    /// monitor-level broadcast has already completed and is not rolled back;
    /// the failure is logged and swallowed. Returns the monitor-level
    /// handed-to count.
    pub async fn broadcast_alert(&self, monitor_id: &str, alert: Value) -> usize {
        let monitor_data = tag_payload(&alert, &[("monitorId", monitor_id)]);
        let delivered = self.fan_out(
            TopicKind::Monitor,
            monitor_id,
            EVENT_MONITOR_ALERT,
            monitor_data,
        );

        match self.store.find_monitor(monitor_id).await {
            Ok(monitor) => {
                let website_data = tag_payload(
                    &alert,
                    &[
                        ("websiteId", monitor.website_id.as_str()),
                        ("monitorId", monitor_id),
                    ],
                );
                self.fan_out(
                    TopicKind::Website,
                    &monitor.website_id,
                    EVENT_WEBSITE_ALERT,
                    website_data,
                );
            }
            Err(err) => {
                warn!(
                    monitor_id = %monitor_id,
                    error = %err,
                    "Website resolution failed, skipping website-level alert fan-out"
                );
            }
        }

        delivered
    }

    /// Pushes `data` to every live subscriber of a topic.
    fn fan_out(&self, kind: TopicKind, topic_id: &str, event: &str, data: Value) -> usize {
        let subscribers = self.subscriptions.subscribers_of(kind, topic_id);

        if subscribers.is_empty() {
            trace!(kind = %kind, topic_id = %topic_id, event = %event, "No subscribers for topic");
            return 0;
        }

        let mut delivered = 0;
        for connection_id in subscribers {
            let Some(sender) = self.connections.sender(connection_id) else {
                trace!(
                    connection_id = %connection_id,
                    topic_id = %topic_id,
                    "Skipping stale subscriber"
                );
                continue;
            };

            if sender.send(ServerFrame::new(event, data.clone())).is_ok() {
                delivered += 1;
            } else {
                // Writer task already gone; disconnect cleanup will purge it.
                trace!(
                    connection_id = %connection_id,
                    topic_id = %topic_id,
                    "Subscriber channel closed"
                );
            }
        }

        debug!(
            kind = %kind,
            topic_id = %topic_id,
            event = %event,
            delivered,
            "Fan-out complete"
        );

        delivered
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("connections", &self.connections.len())
            .finish()
    }
}

/// Merges topic tags into an event payload.
///
/// Object payloads get the tag fields inserted (overwriting collisions, so
/// a client cannot spoof the topic id); anything else is wrapped under a
/// `payload` key first.
fn tag_payload(payload: &Value, tags: &[(&str, &str)]) -> Value {
    let mut object = match payload {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other.clone());
            map
        }
    };

    for (key, value) in tags {
        object.insert((*key).to_string(), Value::String((*value).to_string()));
    }

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::ConnectionId;

    struct TestRig {
        connections: Arc<ConnectionMap>,
        subscriptions: Arc<SubscriptionIndex>,
        broadcaster: EventBroadcaster,
    }

    fn rig_with_store(store_url: &str) -> TestRig {
        let connections = Arc::new(ConnectionMap::new());
        let subscriptions = Arc::new(SubscriptionIndex::new());
        let store = Arc::new(StoreClient::new(store_url, None).unwrap());
        let broadcaster = EventBroadcaster::new(
            Arc::clone(&connections),
            Arc::clone(&subscriptions),
            store,
        );
        TestRig {
            connections,
            subscriptions,
            broadcaster,
        }
    }

    fn rig() -> TestRig {
        // Unreachable store: monitor-level broadcasts never touch it.
        rig_with_store("http://127.0.0.1:9")
    }

    fn connect(rig: &TestRig) -> (ConnectionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        rig.connections.insert(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn delivers_to_subscribers_and_only_subscribers() {
        let rig = rig();
        let (a, mut rx_a) = connect(&rig);
        let (b, mut rx_b) = connect(&rig);
        let (c, mut rx_c) = connect(&rig);

        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", a);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", b);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m2", c);

        let delivered = rig
            .broadcaster
            .broadcast_monitor_event("m1", json!({ "status": "down" }));

        assert_eq!(delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.event, "monitor:status:update");
            assert_eq!(frame.data["monitorId"], "m1");
            assert_eq!(frame.data["status"], "down");
        }
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_subscribers_delivers_zero() {
        let rig = rig();
        assert_eq!(
            rig.broadcaster.broadcast_monitor_event("m1", json!({})),
            0
        );
    }

    #[tokio::test]
    async fn stale_subscription_entry_is_skipped() {
        let rig = rig();
        let (live, mut rx_live) = connect(&rig);
        let (stale, _rx_stale) = connect(&rig);

        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", live);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", stale);

        // The stale connection has died at transport level but has not been
        // purged from the index yet.
        rig.connections.remove(stale);

        let delivered = rig
            .broadcaster
            .broadcast_monitor_event("m1", json!({ "status": "up" }));

        assert_eq!(delivered, 1);
        assert_eq!(rx_live.recv().await.unwrap().data["monitorId"], "m1");
        // The stale entry is not purged by broadcasting.
        assert_eq!(
            rig.subscriptions
                .subscribers_of(TopicKind::Monitor, "m1")
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn closed_channel_is_not_counted() {
        let rig = rig();
        let (conn, rx) = connect(&rig);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", conn);
        drop(rx);

        assert_eq!(
            rig.broadcaster.broadcast_monitor_event("m1", json!({})),
            0
        );
    }

    #[tokio::test]
    async fn non_object_payload_is_wrapped() {
        let rig = rig();
        let (conn, mut rx) = connect(&rig);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", conn);

        rig.broadcaster
            .broadcast_monitor_event("m1", json!("it broke"));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.data["payload"], "it broke");
        assert_eq!(frame.data["monitorId"], "m1");
    }

    #[tokio::test]
    async fn payload_cannot_spoof_the_topic_tag() {
        let rig = rig();
        let (conn, mut rx) = connect(&rig);
        rig.subscriptions.subscribe(TopicKind::Monitor, "m1", conn);

        rig.broadcaster
            .broadcast_monitor_event("m1", json!({ "monitorId": "forged" }));

        assert_eq!(rx.recv().await.unwrap().data["monitorId"], "m1");
    }

    #[tokio::test]
    async fn alert_fans_out_to_monitor_and_website_subscribers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/monitors/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1",
                "websiteId": "w1",
                "url": "https://w1.example.com/health",
                "status": "down",
                "uptime": 12.5
            })))
            .mount(&server)
            .await;

        let rig = rig_with_store(&server.uri());
        let (monitor_sub, mut rx_monitor) = connect(&rig);
        let (website_sub, mut rx_website) = connect(&rig);

        rig.subscriptions
            .subscribe(TopicKind::Monitor, "m1", monitor_sub);
        rig.subscriptions
            .subscribe(TopicKind::Website, "w1", website_sub);

        let delivered = rig
            .broadcaster
            .broadcast_alert("m1", json!({ "status": "down" }))
            .await;
        assert_eq!(delivered, 1);

        let monitor_frame = rx_monitor.recv().await.unwrap();
        assert_eq!(monitor_frame.event, "monitor:alert");
        assert_eq!(monitor_frame.data["monitorId"], "m1");
        assert!(monitor_frame.data.get("websiteId").is_none());

        let website_frame = rx_website.recv().await.unwrap();
        assert_eq!(website_frame.event, "website:alert");
        assert_eq!(website_frame.data["websiteId"], "w1");
        assert_eq!(website_frame.data["monitorId"], "m1");
        assert_eq!(website_frame.data["status"], "down");
    }

    #[tokio::test]
    async fn website_lookup_failure_does_not_undo_monitor_fanout() {
        // Store unreachable: the second fan-out is skipped, not an error.
        let rig = rig();
        let (monitor_sub, mut rx_monitor) = connect(&rig);
        let (website_sub, mut rx_website) = connect(&rig);

        rig.subscriptions
            .subscribe(TopicKind::Monitor, "m1", monitor_sub);
        rig.subscriptions
            .subscribe(TopicKind::Website, "w1", website_sub);

        let delivered = rig
            .broadcaster
            .broadcast_alert("m1", json!({ "status": "down" }))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_monitor.recv().await.unwrap().event, "monitor:alert");
        assert!(rx_website.try_recv().is_err());
    }

    #[test]
    fn tag_payload_merges_into_objects() {
        let tagged = tag_payload(&json!({ "a": 1 }), &[("monitorId", "m1")]);
        assert_eq!(tagged, json!({ "a": 1, "monitorId": "m1" }));
    }

    #[test]
    fn tag_payload_handles_null() {
        let tagged = tag_payload(&Value::Null, &[("websiteId", "w1")]);
        assert_eq!(tagged, json!({ "websiteId": "w1" }));
    }
}
