//! # Evaluation Errors

use shared_types::{ContractAddress, IndexerError};
use thiserror::Error;

/// Failure modes of contract evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Contract-initiated revert with a contract-supplied reason.
    #[error("execution reverted")]
    Revert(Vec<u8>),

    /// Gas limit exhausted. Recoverable only at the top-level call.
    #[error("out of gas")]
    OutOfGas,

    /// Call or deployment depth limit exceeded.
    #[error("depth limit exceeded at depth {0}")]
    DepthExceeded(u32),

    /// Target contract is already on the active call stack.
    #[error("reentrancy into {0}")]
    Reentrancy(ContractAddress),

    /// Target contract does not exist at this height.
    #[error("missing contract {0}")]
    MissingContract(ContractAddress),

    /// Write attempted against a frozen state snapshot.
    #[error("state is frozen")]
    FrozenState,

    /// The runtime itself failed. Not recoverable; aborts the block.
    #[error("host panic: {0}")]
    HostPanic(String),

    /// A deployment targeted an address that already exists.
    #[error("contract already deployed at {0}")]
    AlreadyDeployed(ContractAddress),

    /// Slot or bytecode loading failed in the storage layer.
    #[error("storage failure during evaluation: {0}")]
    Storage(String),
}

impl EvaluationError {
    /// Whether the error is captured on the transaction receipt rather
    /// than failing the block.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Revert(_)
                | Self::OutOfGas
                | Self::DepthExceeded(_)
                | Self::Reentrancy(_)
                | Self::MissingContract(_)
                | Self::AlreadyDeployed(_)
        )
    }
}

impl From<EvaluationError> for IndexerError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Revert(reason) => IndexerError::Revert(reason),
            EvaluationError::OutOfGas => IndexerError::OutOfGas,
            EvaluationError::DepthExceeded(_) => IndexerError::DepthExceeded,
            EvaluationError::Reentrancy(addr) => IndexerError::Reentrancy(addr.to_string()),
            EvaluationError::MissingContract(addr) => {
                IndexerError::NotFound(format!("contract {addr}"))
            }
            EvaluationError::AlreadyDeployed(addr) => {
                IndexerError::AlreadyExists(format!("contract {addr}"))
            }
            EvaluationError::FrozenState => IndexerError::Internal("frozen state".into()),
            EvaluationError::HostPanic(detail) => IndexerError::Internal(detail),
            EvaluationError::Storage(detail) => IndexerError::Storage(detail),
        }
    }
}
