//! Error types for the probe engine.
//!
//! Only precondition failures (connection, unsupported backend, not connected,
//! configuration) ever reach a caller. Failures inside a single analysis
//! category are captured into that category's report instead.

use thiserror::Error;

/// Errors raised by term-probe operations.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The backend could not be reached or rejected the credentials.
    #[error("Connection to {backend} failed: {message}")]
    Connection {
        /// Backend driver name (e.g. "mongodb")
        backend: String,
        /// Human-readable failure description
        message: String,
        /// Optional underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested backend kind is unknown or its driver is not compiled in.
    #[error("Unsupported backend: {kind}")]
    UnsupportedBackend { kind: String },

    /// An analysis was requested while no backend is connected.
    #[error("No database connected")]
    NotConnected,

    /// A single analysis category failed.
    #[error("{category} analysis failed: {message}")]
    CategoryAnalysis { category: String, message: String },

    /// A driver query failed.
    #[error("Query against {backend} failed: {message}")]
    Query { backend: String, message: String },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, ProbeError>`.
pub type Result<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    /// Creates a connection error without an underlying source.
    pub fn connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection error wrapping the driver's error.
    pub fn connection_with_source(
        backend: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a query error.
    pub fn query(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported backend error.
    pub fn unsupported_backend(kind: impl Into<String>) -> Self {
        Self::UnsupportedBackend { kind: kind.into() }
    }

    /// Creates a category analysis error.
    pub fn category_analysis(category: impl ToString, message: impl Into<String>) -> Self {
        Self::CategoryAnalysis {
            category: category.to_string(),
            message: message.into(),
        }
    }

    /// Returns true for the precondition errors that are surfaced to callers
    /// rather than folded into a report.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ProbeError::Connection { .. }
                | ProbeError::UnsupportedBackend { .. }
                | ProbeError::NotConnected
                | ProbeError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_connection_error_display() {
        let err = ProbeError::connection("mongodb", "authentication failed");
        assert_eq!(
            err.to_string(),
            "Connection to mongodb failed: authentication failed"
        );
    }

    #[test]
    fn test_connection_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ProbeError::connection_with_source("redis", "unreachable", Box::new(source));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            ProbeError::NotConnected.to_string(),
            "No database connected"
        );
    }

    #[test]
    fn test_precondition_classification() {
        assert!(ProbeError::NotConnected.is_precondition());
        assert!(ProbeError::unsupported_backend("couchdb").is_precondition());
        assert!(!ProbeError::query("mongodb", "timeout").is_precondition());
        assert!(!ProbeError::category_analysis("quality", "boom").is_precondition());
    }
}
