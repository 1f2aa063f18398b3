//! # Block Processing Errors

use opx_merkle::MerkleError;
use opx_storage::StorageError;
use opx_vm::EvaluationError;
use shared_types::{ConsensusError, IndexerError};
use thiserror::Error;

/// Failures that abort a block. The owning task transitions to REVERTED
/// and rolls back everything at or above the block's height.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// The cancellation signal was observed at a safepoint.
    #[error("block processing cancelled")]
    Cancelled,

    /// Consensus ruleset resolution failed (including unknown upgrades).
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Storage failed during execution or finalize.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Non-recoverable evaluator failure (host panic, storage).
    #[error(transparent)]
    Evaluation(EvaluationError),

    /// Commitment tree failure.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

impl From<ProcessError> for IndexerError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => IndexerError::Cancelled,
            ProcessError::Consensus(e) => IndexerError::Internal(e.to_string()),
            ProcessError::Storage(e) => e.into(),
            ProcessError::Evaluation(e) => e.into(),
            ProcessError::Merkle(e) => IndexerError::Internal(e.to_string()),
        }
    }
}
