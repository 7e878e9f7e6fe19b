//! SitePulse Server - Real-time monitor event hub.
//!
//! This crate is the real-time distribution layer of the SitePulse uptime
//! monitoring platform. It is responsible for:
//! - Multiplexing many concurrent WebSocket client connections
//! - Authenticating each connection against one of three credential domains
//! - Tracking per-monitor and per-website subscription interest
//! - Fanning status updates and alerts out to exactly the interested,
//!   currently connected clients
//!
//! # Architecture
//!
//! Everything shared lives in one [`hub::EventHub`]: the connection table,
//! the principal registry, the subscription index, the custom-handler table,
//! and the data-store client. The check scheduler (an external process)
//! feeds events in via `POST /events` or, when embedded, via the hub's
//! broadcast methods; clients subscribe over a persistent WebSocket. Events
//! are delivered best-effort and never persisted — users, websites, and
//! monitors live in a separate data store the hub only reads.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod extensions;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod store;
pub mod subscriptions;
pub mod types;
