//! Error types for the cfddns system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for cfddns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the cfddns system
#[derive(Error, Debug)]
pub enum Error {
    /// Every lookup service failed or returned unusable data
    #[error("Address resolution failed: {0}")]
    Resolution(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record or zone not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Create rejected because a matching record already exists
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A record type outside {A, AAAA} reached the engine
    #[error("Invalid record type: {0}")]
    InvalidRecordType(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The enclosing pass was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// A single (record, type) unit of work failed
    #[error("failed to update {name} ({record_type}): {source}")]
    Record {
        /// Fully-qualified record name
        name: String,
        /// Record type as configured
        record_type: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Some units of work in a pass failed; the rest were committed
    #[error("encountered {failed} error(s) during update of {total} record(s)")]
    PartialFailure {
        /// Number of failed units
        failed: usize,
        /// Number of units in the pass
        total: usize,
    },

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an address resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an invalid record type error
    pub fn invalid_record_type(msg: impl Into<String>) -> Self {
        Self::InvalidRecordType(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap an error with the (record, type) pair it belongs to
    pub fn for_record(
        name: impl Into<String>,
        record_type: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::Record {
            name: name.into(),
            record_type: record_type.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_names_record_and_type() {
        let err = Error::for_record(
            "home.example.com",
            "AAAA",
            Error::resolution("all services exhausted"),
        );

        let msg = err.to_string();
        assert!(msg.contains("home.example.com"));
        assert!(msg.contains("AAAA"));
        assert!(msg.contains("all services exhausted"));
    }

    #[test]
    fn record_error_preserves_source() {
        use std::error::Error as _;

        let err = Error::for_record("a.example.com", "A", Error::auth("bad token"));
        let source = err.source().expect("source is preserved");
        assert_eq!(source.to_string(), "Authentication failed: bad token");
    }

    #[test]
    fn partial_failure_reports_count() {
        let err = Error::PartialFailure {
            failed: 2,
            total: 5,
        };
        assert_eq!(
            err.to_string(),
            "encountered 2 error(s) during update of 5 record(s)"
        );
    }
}
