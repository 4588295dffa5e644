//! Error types for vpnportal
//!
//! This module defines all error types used throughout the portal core,
//! using `thiserror` for ergonomic error handling.
//!
//! The variants mirror the failure taxonomy of the trusted discovery
//! pipeline and the OAuth broker: transport failures are the only kind a
//! caller is expected to retry; signature, rollback, and malformed-document
//! failures are fatal for the fetch attempt and never persisted.

use thiserror::Error;

/// Main error type for portal operations
///
/// This enum encompasses all possible errors that can occur during
/// discovery updates, provider lookups, OAuth token exchanges, session
/// handling, and request input validation.
#[derive(Error, Debug)]
pub enum PortalError {
    /// Network/HTTP failure reaching a remote endpoint (retryable by caller)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Discovery document signature did not verify
    #[error("Verification error: {0}")]
    Verification(String),

    /// A fetched discovery document reported an older sequence number than
    /// the one already trusted and stored
    #[error("Rollback detected: stored seq={stored}, fetched seq={fetched}")]
    Rollback {
        /// Sequence number of the currently persisted document
        stored: u64,
        /// Sequence number reported by the newly fetched document
        fetched: u64,
    },

    /// Structurally invalid discovery or provider-info JSON
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// OAuth callback failure: state mismatch, provider error response, or
    /// token endpoint rejection
    #[error("OAuth exchange error: {0}")]
    OAuthExchange(String),

    /// Malformed untrusted request input (baseUri, profileId, orgId)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session domain/path binding mismatch; the session must not be
    /// trusted further
    #[error("Session binding error: {0}")]
    SessionBinding(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PortalError {
    /// Returns the HTTP status code a host should surface for this error.
    ///
    /// Input validation problems are client errors; everything else is an
    /// operational failure. Verification/rollback/malformed-document
    /// failures must never produce a response that implies success.
    pub fn http_status(&self) -> u16 {
        match self {
            PortalError::Validation(_) => 400,
            PortalError::SessionBinding(_) => 400,
            _ => 500,
        }
    }

    /// Returns `true` when a caller may reasonably retry the operation.
    ///
    /// Only transport-level failures qualify; the core defines no retry
    /// policy of its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortalError::Transport(_) | PortalError::Http(_))
    }
}

/// Result type alias for portal operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = PortalError::Transport("connection refused".to_string());
        assert_eq!(error.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_verification_error_display() {
        let error = PortalError::Verification("unable to verify signature".to_string());
        assert_eq!(
            error.to_string(),
            "Verification error: unable to verify signature"
        );
    }

    #[test]
    fn test_rollback_error_display() {
        let error = PortalError::Rollback {
            stored: 5,
            fetched: 4,
        };
        let s = error.to_string();
        assert!(s.contains("stored seq=5"));
        assert!(s.contains("fetched seq=4"));
    }

    #[test]
    fn test_malformed_document_error_display() {
        let error = PortalError::MalformedDocument("not JSON".to_string());
        assert_eq!(error.to_string(), "Malformed document: not JSON");
    }

    #[test]
    fn test_oauth_exchange_error_display() {
        let error = PortalError::OAuthExchange("state mismatch".to_string());
        assert_eq!(error.to_string(), "OAuth exchange error: state mismatch");
    }

    #[test]
    fn test_validation_error_is_client_error() {
        let error = PortalError::Validation("invalid baseUri".to_string());
        assert_eq!(error.http_status(), 400);
    }

    #[test]
    fn test_rollback_error_is_server_error() {
        let error = PortalError::Rollback {
            stored: 2,
            fetched: 1,
        };
        assert_eq!(error.http_status(), 500);
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(PortalError::Transport("timeout".to_string()).is_retryable());
        assert!(!PortalError::Verification("bad".to_string()).is_retryable());
        assert!(!PortalError::Rollback {
            stored: 1,
            fetched: 0
        }
        .is_retryable());
        assert!(!PortalError::OAuthExchange("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: PortalError = io_error.into();
        assert!(matches!(error, PortalError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let error: PortalError = json_error.into();
        assert!(matches!(error, PortalError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PortalError>();
    }
}
