//! # Error Taxonomy
//!
//! The domain error kinds every subsystem converts into at its boundary.
//! Subsystem crates keep their own richer error enums and provide `From`
//! impls into [`IndexerError`].

use thiserror::Error;

/// Domain error kinds surfaced across subsystem boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert rejected because the entity already exists. Never retried.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Contract execution exhausted its gas limit.
    #[error("out of gas")]
    OutOfGas,

    /// Contract execution reverted with a contract-supplied reason.
    #[error("reverted")]
    Revert(Vec<u8>),

    /// Call or deployment depth limit exceeded.
    #[error("call depth exceeded")]
    DepthExceeded,

    /// Re-entered a contract already on the active call stack.
    #[error("reentrancy rejected for {0}")]
    Reentrancy(String),

    /// Operation did not complete within its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Operation observed the cancellation signal at a safepoint.
    #[error("cancelled")]
    Cancelled,

    /// Persistent storage failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Caller lacks the required authorization.
    #[error("authorization required")]
    AuthRequired,

    /// Malformed wire frame or handshake violation.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Caller exceeded its request budget.
    #[error("rate limited")]
    RateLimited,

    /// Submission rejected above the queue high-water mark.
    #[error("backpressure: {0}")]
    Backpressure(String),
}

impl IndexerError {
    /// Stable domain code for the external API surface.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::OutOfGas => "OUT_OF_GAS",
            Self::Revert(_) => "REVERT",
            Self::DepthExceeded => "DEPTH_EXCEEDED",
            Self::Reentrancy(_) => "REENTRANCY",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Storage(_) => "STORAGE",
            Self::Internal(_) => "INTERNAL",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::Backpressure(_) => "BACKPRESSURE",
        }
    }

    /// Whether the error is recoverable inside block processing: the
    /// transaction is recorded as failed and the block continues.
    #[must_use]
    pub fn is_transaction_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfGas | Self::Revert(_) | Self::DepthExceeded | Self::Reentrancy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(IndexerError::OutOfGas.code(), "OUT_OF_GAS");
        assert_eq!(IndexerError::NotFound("x".into()).code(), "NOT_FOUND");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(IndexerError::Revert(vec![]).is_transaction_recoverable());
        assert!(IndexerError::Reentrancy("oc1ab".into()).is_transaction_recoverable());
        assert!(!IndexerError::Storage("io".into()).is_transaction_recoverable());
        assert!(!IndexerError::Cancelled.is_transaction_recoverable());
    }
}
