//! HTTP client for the external data store.
//!
//! The hub never persists anything itself; websites, monitors, and ownership
//! live in a separate store service exposing a small read-only API. This
//! module wraps that API behind typed methods with a hard request timeout so
//! a slow store cannot wedge a connection's handler.
//!
//! The client is cheap to clone (reqwest's client is reference-counted) and
//! is shared across the hub via `Arc`.
//!
//! # Endpoints consumed
//!
//! - `GET /websites?ownerId=…` — websites owned by an end-user
//! - `GET /websites?contributorId=…` — websites assigned to a contributor
//! - `GET /websites` — the whole fleet (operator dashboards)
//! - `GET /monitors?websiteId=…&websiteId=…` — monitors for a website set
//! - `GET /monitors/{id}` — a single monitor (alert website resolution)

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error};

use crate::types::{Monitor, Website};

/// Hard timeout for data-store requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when talking to the data store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected our credentials.
    #[error("store rejected credentials")]
    Unauthorized,

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request timed out.
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// The store is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something we could not interpret.
    #[error("invalid store response: {0}")]
    InvalidResponse(String),

    /// Client-side configuration problem (e.g. bad base URL).
    #[error("store client configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Returns `true` for failures worth retrying later (the store itself
    /// may recover), as opposed to definitive answers like `NotFound`.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Client for the external data-store API.
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl StoreClient {
    /// Creates a new store client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                StoreError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Websites owned by an end-user.
    pub async fn find_websites_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Website>, StoreError> {
        self.get_json("/websites", &[("ownerId", owner_id)]).await
    }

    /// Websites a contributor is assigned to check.
    pub async fn find_websites_by_contributor(
        &self,
        contributor_id: &str,
    ) -> Result<Vec<Website>, StoreError> {
        self.get_json("/websites", &[("contributorId", contributor_id)])
            .await
    }

    /// Every website in the store (operator dashboards).
    pub async fn list_websites(&self) -> Result<Vec<Website>, StoreError> {
        self.get_json("/websites", &[]).await
    }

    /// All monitors belonging to any of the given websites.
    ///
    /// An empty id list short-circuits to an empty result without a request.
    pub async fn find_monitors_by_websites(
        &self,
        website_ids: &[String],
    ) -> Result<Vec<Monitor>, StoreError> {
        if website_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query: Vec<(&str, &str)> = website_ids
            .iter()
            .map(|id| ("websiteId", id.as_str()))
            .collect();
        self.get_json("/monitors", &query).await
    }

    /// A single monitor by id, used to resolve the owning website during
    /// alert fan-out.
    pub async fn find_monitor(&self, monitor_id: &str) -> Result<Monitor, StoreError> {
        self.get_json(&format!("/monitors/{monitor_id}"), &[]).await
    }

    /// Performs a GET against the store and decodes the JSON response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StoreError> {
        let url = format!("{}{}", self.base_url, path);

        debug!(url = %url, "Querying data store");

        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(REQUEST_TIMEOUT)
            } else if e.is_connect() {
                StoreError::Unavailable(format!("connection failed: {e}"))
            } else {
                StoreError::Unavailable(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(StoreError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, url = %url, "Unexpected store response");
            return Err(StoreError::InvalidResponse(format!(
                "unexpected status {status}: {body}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            StoreError::InvalidResponse(format!("failed to parse store response: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn website_json(id: &str, owner: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("site {id}"),
            "url": format!("https://{id}.example.com"),
            "ownerId": owner
        })
    }

    fn monitor_json(id: &str, website: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "websiteId": website,
            "url": format!("https://{website}.example.com/health"),
            "status": status,
            "uptime": 99.0
        })
    }

    #[tokio::test]
    async fn find_websites_by_owner_sends_owner_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(query_param("ownerId", "u-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([website_json("w1", "u-1")])),
            )
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let websites = client.find_websites_by_owner("u-1").await.unwrap();

        assert_eq!(websites.len(), 1);
        assert_eq!(websites[0].id, "w1");
        assert_eq!(websites[0].owner_id, "u-1");
    }

    #[tokio::test]
    async fn find_websites_by_contributor_sends_contributor_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(query_param("contributorId", "c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let websites = client.find_websites_by_contributor("c-1").await.unwrap();

        assert!(websites.is_empty());
    }

    #[tokio::test]
    async fn find_monitors_by_websites_repeats_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/monitors"))
            .and(query_param("websiteId", "w1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                monitor_json("m1", "w1", "up"),
                monitor_json("m2", "w1", "down"),
            ])))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let monitors = client
            .find_monitors_by_websites(&["w1".to_string()])
            .await
            .unwrap();

        assert_eq!(monitors.len(), 2);
    }

    #[tokio::test]
    async fn find_monitors_with_empty_id_list_skips_request() {
        // No mock server at all: a request would fail loudly.
        let client = StoreClient::new("http://127.0.0.1:9", None).unwrap();
        let monitors = client.find_monitors_by_websites(&[]).await.unwrap();
        assert!(monitors.is_empty());
    }

    #[tokio::test]
    async fn find_monitor_hits_id_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/monitors/m1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(monitor_json("m1", "w1", "up")),
            )
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let monitor = client.find_monitor("m1").await.unwrap();

        assert_eq!(monitor.id, "m1");
        assert_eq!(monitor.website_id, "w1");
    }

    #[tokio::test]
    async fn missing_monitor_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/monitors/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let err = client.find_monitor("ghost").await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let err = client.list_websites().await.unwrap_err();

        assert!(matches!(err, StoreError::Unauthorized));
    }

    #[tokio::test]
    async fn server_error_maps_to_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let err = client.list_websites().await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_store_maps_to_unavailable() {
        // Port 9 (discard) is virtually guaranteed to refuse connections.
        let client = StoreClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.list_websites().await.unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body_maps_to_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), None).unwrap();
        let err = client.list_websites().await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(wiremock::matchers::header(
                "Authorization",
                "Bearer store-key",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = StoreClient::new(server.uri(), Some("store-key".to_string())).unwrap();
        assert!(client.list_websites().await.is_ok());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = StoreClient::new("http://store.internal:3000/", None).unwrap();
        assert_eq!(client.base_url, "http://store.internal:3000");
    }
}
