//! Error types for artifact-transfer
//!
//! This module provides the error taxonomy for the library:
//! - Remote failures (transport errors, non-success status, malformed responses)
//! - Per-unit transfer failures, which are counted rather than propagated
//! - Provenance (build-info) failures, which are always command-level errors
//! - Configuration and pattern errors raised before any network traffic

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for artifact-transfer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for artifact-transfer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "threads")
        key: Option<String>,
    },

    /// The remote service answered with a non-success status
    #[error("remote service response: {status}\n{body}")]
    RemoteStatus {
        /// Status line returned by the service (e.g., "500 Internal Server Error")
        status: String,
        /// Raw response body, pretty-printed when it is JSON
        body: String,
    },

    /// Invalid file pattern in a search or upload specification
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// A single transfer unit failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Build-info read or write failed
    #[error("build-info error: {0}")]
    BuildInfo(#[from] BuildInfoError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Process exit code the command line reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } | Error::InvalidPattern { .. } => 2,
            Error::RemoteStatus { .. } | Error::Network(_) | Error::Url(_) => 3,
            Error::Serialization(_) => 4,
            Error::BuildInfo(_) => 5,
            Error::Transfer(_) | Error::Io(_) => 1,
        }
    }
}

/// Failure of a single upload or download
#[derive(Debug, Error)]
pub enum TransferError {
    /// The remote rejected the transfer
    #[error("{operation} of {path} failed: {status}")]
    Rejected {
        /// "upload" or "download"
        operation: &'static str,
        /// Repository-relative path of the unit
        path: String,
        /// Status line returned by the service
        status: String,
    },

    /// Local file was missing or unreadable
    #[error("local file {path} is not readable: {reason}")]
    LocalFile {
        /// Local path of the unit
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Downloaded content did not match the checksum announced by the remote
    #[error("checksum mismatch for {path}: expected sha1 {expected}, got {actual}")]
    ChecksumMismatch {
        /// Local path written
        path: PathBuf,
        /// Checksum reported by the remote
        expected: String,
        /// Checksum of the received bytes
        actual: String,
    },

    /// The worker running this unit panicked
    #[error("worker {worker_id} aborted: {reason}")]
    WorkerAborted {
        /// Id of the worker that aborted
        worker_id: usize,
        /// Join error description
        reason: String,
    },
}

/// Build-info persistence errors
#[derive(Debug, Error)]
pub enum BuildInfoError {
    /// No general-details record exists for the build
    #[error("no build-info record found for build {name}/{number}")]
    NotFound {
        /// Build name
        name: String,
        /// Build number
        number: String,
    },

    /// Only one of build name / build number was supplied
    #[error("build name and build number must be supplied together")]
    Incomplete,

    /// Reading or writing a build-info file failed
    #[error("build-info file {path}: {reason}")]
    Storage {
        /// File that could not be read or written
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_message_carries_status_and_body() {
        let err = Error::RemoteStatus {
            status: "400 Bad Request".to_string(),
            body: "{\"errors\":[]}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400 Bad Request"));
        assert!(msg.contains("errors"));
    }

    #[test]
    fn config_errors_exit_with_usage_code() {
        assert_eq!(Error::config("threads", "must be at least 1").exit_code(), 2);
        let pattern = Error::InvalidPattern {
            pattern: "".to_string(),
            reason: "empty".to_string(),
        };
        assert_eq!(pattern.exit_code(), 2);
    }

    #[test]
    fn build_info_errors_are_distinct_from_transfer_errors() {
        let build = Error::from(BuildInfoError::Incomplete);
        let transfer = Error::from(TransferError::WorkerAborted {
            worker_id: 1,
            reason: "panic".to_string(),
        });
        assert_eq!(build.exit_code(), 5);
        assert_eq!(transfer.exit_code(), 1);
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("server.url", "missing") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("server.url"));
                assert_eq!(message, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
