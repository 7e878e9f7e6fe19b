//! Dashboard snapshot assembly.
//!
//! A dashboard is a read-only summary of one principal's websites and
//! monitors, recomputed from the external store on every request — there is
//! no cache, so staleness is bounded only by store read latency.

use tracing::debug;

use crate::store::{StoreClient, StoreError};
use crate::types::{
    DashboardSnapshot, DashboardStats, Monitor, MonitorStatus, PrincipalDomain, Website,
};

/// Assembles a dashboard snapshot for an authenticated principal.
///
/// Website resolution depends on the domain: end-users see the websites they
/// own, contributors the websites they are assigned to, operators the whole
/// fleet. A principal with no websites (including one the store has no
/// record of at all) gets a zero-valued snapshot — an empty or
/// not-yet-provisioned account is a valid state, not an error, and answering
/// uniformly avoids leaking which accounts exist.
///
/// # Errors
///
/// Propagates [`StoreError`] for transport-level store failures.
pub async fn build_dashboard(
    store: &StoreClient,
    domain: PrincipalDomain,
    principal_id: &str,
) -> Result<DashboardSnapshot, StoreError> {
    let websites = match resolve_websites(store, domain, principal_id).await {
        Ok(websites) => websites,
        Err(StoreError::NotFound(_)) => Vec::new(),
        Err(err) => return Err(err),
    };

    if websites.is_empty() {
        debug!(
            domain = %domain,
            principal_id = %principal_id,
            "Dashboard for principal with no websites"
        );
        return Ok(DashboardSnapshot::empty());
    }

    let website_ids: Vec<String> = websites.iter().map(|w| w.id.clone()).collect();
    let monitors = store.find_monitors_by_websites(&website_ids).await?;
    let stats = compute_stats(&monitors);

    debug!(
        domain = %domain,
        principal_id = %principal_id,
        websites = websites.len(),
        monitors = monitors.len(),
        "Dashboard assembled"
    );

    Ok(DashboardSnapshot {
        websites,
        monitors,
        stats,
    })
}

async fn resolve_websites(
    store: &StoreClient,
    domain: PrincipalDomain,
    principal_id: &str,
) -> Result<Vec<Website>, StoreError> {
    match domain {
        PrincipalDomain::User => store.find_websites_by_owner(principal_id).await,
        PrincipalDomain::Contributor => store.find_websites_by_contributor(principal_id).await,
        PrincipalDomain::Operator => store.list_websites().await,
    }
}

/// Aggregates monitor statistics: up/down counts and mean uptime.
///
/// Mean uptime is 0 for an empty monitor list.
fn compute_stats(monitors: &[Monitor]) -> DashboardStats {
    if monitors.is_empty() {
        return DashboardStats::zero();
    }

    let monitors_up = monitors
        .iter()
        .filter(|m| m.status == MonitorStatus::Up)
        .count();
    let total_uptime: f64 = monitors.iter().map(|m| m.uptime).sum();

    DashboardStats {
        total_monitors: monitors.len(),
        monitors_up,
        monitors_down: monitors.len() - monitors_up,
        average_uptime: total_uptime / monitors.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn monitor(id: &str, website_id: &str, status: MonitorStatus, uptime: f64) -> Monitor {
        Monitor {
            id: id.to_string(),
            website_id: website_id.to_string(),
            url: format!("https://{website_id}.example.com/health"),
            status,
            uptime,
            last_checked_at: None,
        }
    }

    // ========================================================================
    // compute_stats
    // ========================================================================

    #[test]
    fn stats_for_empty_monitor_list_are_zero() {
        assert_eq!(compute_stats(&[]), DashboardStats::zero());
    }

    #[test]
    fn stats_count_up_and_down() {
        let monitors = vec![
            monitor("m1", "w1", MonitorStatus::Up, 100.0),
            monitor("m2", "w1", MonitorStatus::Down, 50.0),
            monitor("m3", "w2", MonitorStatus::Up, 90.0),
        ];

        let stats = compute_stats(&monitors);
        assert_eq!(stats.total_monitors, 3);
        assert_eq!(stats.monitors_up, 2);
        assert_eq!(stats.monitors_down, 1);
        assert!((stats.average_uptime - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_for_single_monitor() {
        let stats = compute_stats(&[monitor("m1", "w1", MonitorStatus::Down, 0.0)]);
        assert_eq!(stats.monitors_up, 0);
        assert_eq!(stats.monitors_down, 1);
        assert_eq!(stats.average_uptime, 0.0);
    }

    // ========================================================================
    // build_dashboard
    // ========================================================================

    #[tokio::test]
    async fn principal_with_no_websites_gets_empty_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(query_param("ownerId", "u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let snapshot = build_dashboard(&store, PrincipalDomain::User, "u-1")
            .await
            .unwrap();

        assert_eq!(snapshot, DashboardSnapshot::empty());
    }

    #[tokio::test]
    async fn unknown_principal_record_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let snapshot = build_dashboard(&store, PrincipalDomain::User, "ghost")
            .await
            .unwrap();

        assert_eq!(snapshot, DashboardSnapshot::empty());
    }

    #[tokio::test]
    async fn aggregates_monitors_across_owned_websites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(query_param("ownerId", "u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "w1", "name": "one", "url": "https://one.example.com", "ownerId": "u-1" },
                { "id": "w2", "name": "two", "url": "https://two.example.com", "ownerId": "u-1" },
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/monitors"))
            .and(query_param("websiteId", "w1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "m1", "websiteId": "w1", "url": "https://one.example.com", "status": "up", "uptime": 99.0 },
                { "id": "m2", "websiteId": "w2", "url": "https://two.example.com", "status": "down", "uptime": 73.0 },
            ])))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let snapshot = build_dashboard(&store, PrincipalDomain::User, "u-1")
            .await
            .unwrap();

        assert_eq!(snapshot.websites.len(), 2);
        assert_eq!(snapshot.monitors.len(), 2);
        assert_eq!(snapshot.stats.total_monitors, 2);
        assert_eq!(snapshot.stats.monitors_up, 1);
        assert_eq!(snapshot.stats.monitors_down, 1);
        assert!((snapshot.stats.average_uptime - 86.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn contributor_dashboard_resolves_assigned_websites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .and(query_param("contributorId", "c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let snapshot = build_dashboard(&store, PrincipalDomain::Contributor, "c-1")
            .await
            .unwrap();

        assert_eq!(snapshot, DashboardSnapshot::empty());
    }

    #[tokio::test]
    async fn operator_dashboard_lists_the_whole_fleet() {
        let server = MockServer::start().await;
        // No ownerId/contributorId filter on the operator query.
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "w1", "name": "one", "url": "https://one.example.com", "ownerId": "u-1" },
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/monitors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let snapshot = build_dashboard(&store, PrincipalDomain::Operator, "a-1")
            .await
            .unwrap();

        assert_eq!(snapshot.websites.len(), 1);
        assert_eq!(snapshot.stats, DashboardStats::zero());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/websites"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = StoreClient::new(server.uri(), None).unwrap();
        let result = build_dashboard(&store, PrincipalDomain::User, "u-1").await;

        assert!(result.is_err());
    }
}
