//! Unified error system for privilege resolution
//!
//! A single error type shared by the server-side evaluator, the catalog
//! fetcher and the client resolution cache. `ActorNotFound` and
//! `StoreUnavailable` are never collapsed into a Deny or an Allow.

use serde::{Deserialize, Serialize};

/// Unified error type for all RCMS privilege operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RcmsError {
    /// Actor id does not resolve to a known actor
    #[error("Actor not found: {actor_id}")]
    ActorNotFound {
        /// The unresolved actor id
        actor_id: String,
    },

    /// Policy store unreachable or failed a read/write
    #[error("Policy store unavailable: {message}")]
    StoreUnavailable {
        /// Error message describing the store failure
        message: String,
    },

    /// A superseded fetch result was dropped
    #[error("Stale generation discarded: ticket {ticket} superseded by {current}")]
    StaleGenerationDiscarded {
        /// Ticket captured by the discarded fetch
        ticket: u64,
        /// Ticket that superseded it
        current: u64,
    },

    /// Operation did not complete within its bound
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Bound that was exceeded
        timeout_ms: u64,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Config error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl RcmsError {
    /// Create an actor-not-found error
    pub fn actor_not_found(actor_id: impl Into<String>) -> Self {
        Self::ActorNotFound {
            actor_id: actor_id.into(),
        }
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a stale-generation error
    pub fn stale_generation(ticket: u64, current: u64) -> Self {
        Self::StaleGenerationDiscarded { ticket, current }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for the internal supersession signal, which is never shown to UI.
    pub fn is_stale_generation(&self) -> bool {
        matches!(self, Self::StaleGenerationDiscarded { .. })
    }
}

/// Standard Result type for RCMS operations
pub type Result<T> = std::result::Result<T, RcmsError>;

impl From<std::io::Error> for RcmsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for RcmsError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_json::Error> for RcmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(err.to_string())
    }
}
