//! Error taxonomy for protected calls.
//!
//! Adapters (HTTP clients, database drivers, AI providers) map their failures
//! into these variants so retry conditions match on the tag instead of
//! inspecting messages.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Network-level failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorCode {
    ConnectionReset,
    ConnectionRefused,
    TimedOut,
    DnsFailure,
}

impl fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            NetworkErrorCode::ConnectionReset => "ECONNRESET",
            NetworkErrorCode::ConnectionRefused => "ECONNREFUSED",
            NetworkErrorCode::TimedOut => "ETIMEDOUT",
            NetworkErrorCode::DnsFailure => "ENOTFOUND",
        };
        f.write_str(code)
    }
}

/// Database failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Connection could not be established or was lost.
    Connection,
    /// Statement or pool checkout timed out.
    Timeout,
    /// The query itself failed (constraint, syntax, ...).
    Query,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DatabaseErrorKind::Connection => "connection",
            DatabaseErrorKind::Timeout => "timeout",
            DatabaseErrorKind::Query => "query",
        };
        f.write_str(kind)
    }
}

/// Errors surfaced by protected operations.
///
/// `Clone` because a single outcome is delivered to every deduplicated joiner
/// and to every member of a failed batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// The breaker for `service` is open and the reset window has not elapsed.
    #[error("circuit breaker for '{service}' is open")]
    CircuitOpen { service: String },

    /// A per-attempt deadline elapsed before the operation settled.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP-shaped failure.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport failure below HTTP.
    #[error("network error {code}: {message}")]
    Network {
        code: NetworkErrorCode,
        message: String,
    },

    /// Database failure.
    #[error("database {kind} error: {message}")]
    Database {
        kind: DatabaseErrorKind,
        message: String,
    },

    /// The bulk processor failed or the batch was dropped.
    #[error("batch processing failed: {0}")]
    Batch(String),

    /// The bulk processor returned fewer results than queued items.
    #[error("no result for batch item at index {index}")]
    MissingBatchResult { index: usize },

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(code: NetworkErrorCode, message: impl Into<String>) -> Self {
        ServiceError::Network {
            code,
            message: message.into(),
        }
    }

    pub fn database(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        ServiceError::Database {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        ServiceError::Other(message.into())
    }

    /// Whether the failure is worth another attempt regardless of attempt count.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http { status, .. } => {
                (500..600).contains(status) || *status == 429 || *status == 408
            }
            ServiceError::Network { .. } | ServiceError::Timeout(_) => true,
            ServiceError::Database { kind, .. } => {
                matches!(kind, DatabaseErrorKind::Connection | DatabaseErrorKind::Timeout)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Serialization(e.to_string())
    }
}

/// Result alias for protected operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
