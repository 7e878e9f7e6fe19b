//! Shared domain types for the SitePulse server.
//!
//! This module defines the identity, topic, and store-record types that flow
//! through the hub. Store records mirror the JSON documents served by the
//! external data store; field names use `camelCase` to match that API contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-unique identifier for a live client connection.
pub type ConnectionId = Uuid;

/// The credential domain a principal belongs to.
///
/// The three domains are disjoint: a user id and a contributor id are
/// unrelated namespaces even if the strings happen to collide. The serialized
/// form matches the wire protocol (`"user"`, `"contributor"`, `"admin"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalDomain {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "contributor")]
    Contributor,
    #[serde(rename = "admin")]
    Operator,
}

impl PrincipalDomain {
    /// The wire-protocol name for this domain.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Contributor => "contributor",
            Self::Operator => "admin",
        }
    }

    /// Parses a wire-protocol domain name (`user` / `contributor` / `admin`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "contributor" => Some(Self::Contributor),
            "admin" => Some(Self::Operator),
            _ => None,
        }
    }
}

impl std::fmt::Display for PrincipalDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity: a domain plus the id extracted from the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub domain: PrincipalDomain,
    pub id: String,
}

impl Principal {
    #[must_use]
    pub fn new(domain: PrincipalDomain, id: impl Into<String>) -> Self {
        Self {
            domain,
            id: id.into(),
        }
    }
}

/// The kind of topic a subscription is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Monitor,
    Website,
}

impl TopicKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Website => "website",
        }
    }
}

impl std::fmt::Display for TopicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of event the check scheduler hands to the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    StatusUpdate,
    Alert,
}

/// Up/down state of a monitor as reported by the data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
}

/// A website record from the external data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Website {
    pub id: String,
    pub name: String,
    pub url: String,
    pub owner_id: String,
}

/// A monitor record from the external data store.
///
/// `uptime` is a percentage in `[0, 100]` computed by the store from check
/// history; the hub only aggregates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: String,
    pub website_id: String,
    pub url: String,
    pub status: MonitorStatus,
    pub uptime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Aggregate monitor statistics for a dashboard snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_monitors: usize,
    pub monitors_up: usize,
    pub monitors_down: usize,
    pub average_uptime: f64,
}

impl DashboardStats {
    /// A zero-valued stats block, used for accounts with no monitors.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            total_monitors: 0,
            monitors_up: 0,
            monitors_down: 0,
            average_uptime: 0.0,
        }
    }
}

/// A consistent read-only summary of one principal's websites and monitors.
///
/// Recomputed from the data store on every request; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub websites: Vec<Website>,
    pub monitors: Vec<Monitor>,
    pub stats: DashboardStats,
}

impl DashboardSnapshot {
    /// The snapshot returned for a principal with no websites.
    ///
    /// An empty account is a valid state, not an error.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            websites: Vec::new(),
            monitors: Vec::new(),
            stats: DashboardStats::zero(),
        }
    }
}
