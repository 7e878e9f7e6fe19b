//! Error types for the SitePulse server.
//!
//! The hub's error taxonomy is deliberately small: every failure is local to
//! the single request or connection that triggered it, and is either surfaced
//! back to that caller or logged and swallowed. No error in one connection's
//! handling may affect another connection's state or delivery.

use thiserror::Error;

use crate::store::StoreError;

/// Top-level error type for hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Authentication or authorization failure.
    ///
    /// Surfaced to the caller as an `*:error` message; the connection
    /// remains open and unauthenticated.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A request payload failed validation (e.g. a missing required field).
    ///
    /// Surfaced per-call; no state is mutated.
    #[error("validation error: {0}")]
    Validation(String),

    /// The external data store could not satisfy a lookup.
    ///
    /// During broadcast website resolution this is logged and swallowed;
    /// during dashboard assembly it is surfaced as a generic `error` message.
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Unexpected internal failure that fits no other category.
    #[error("internal server error: {0}")]
    Internal(String),
}

impl HubError {
    /// Creates a new authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if this error indicates a client-side problem.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Validation(_))
    }

    /// Returns `true` if this error indicates a server-side problem.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Store(_) | Self::WebSocket(_))
    }
}

/// A specialized Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
