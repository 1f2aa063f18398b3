//! # API Errors
//!
//! User-visible failures carry a stable domain code and a sanitized
//! message; internal detail is logged, never returned, unless developer
//! mode is on.

use serde::Serialize;
use shared_types::IndexerError;
use thiserror::Error;
use tracing::debug;

/// A structured, user-visible API error.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Stable domain code (e.g. `NOT_FOUND`).
    pub code: String,
    /// Sanitized, user-safe message.
    pub message: String,
    /// Full detail; populated only in developer mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::new("NOT_FOUND", format!("{what} not found"))
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("INVALID_INPUT", message)
    }

    /// Convert a domain error, sanitizing the message. With
    /// `developer_mode` the original detail is attached.
    #[must_use]
    pub fn from_domain(err: &IndexerError, developer_mode: bool) -> Self {
        let message = match err {
            IndexerError::NotFound(_) => "resource not found".to_string(),
            IndexerError::AlreadyExists(_) => "resource already exists".to_string(),
            IndexerError::InvalidInput(detail) => detail.clone(),
            IndexerError::OutOfGas => "execution ran out of gas".to_string(),
            IndexerError::Revert(_) => "execution reverted".to_string(),
            IndexerError::RateLimited => "rate limit exceeded".to_string(),
            other => {
                debug!(error = %other, "internal error sanitized for api");
                "internal error".to_string()
            }
        };
        Self {
            code: err.code().to_string(),
            message,
            detail: developer_mode.then(|| err.to_string()),
        }
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        Self::from_domain(&err, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_sanitized() {
        let err = ApiError::from_domain(
            &IndexerError::Storage("rocksdb: io error /secret/path".into()),
            false,
        );
        assert_eq!(err.code, "STORAGE");
        assert_eq!(err.message, "internal error");
        assert!(err.detail.is_none());
    }

    #[test]
    fn test_developer_mode_attaches_detail() {
        let err = ApiError::from_domain(&IndexerError::Storage("detail".into()), true);
        assert!(err.detail.unwrap().contains("detail"));
    }
}
