//! # Indexing Task
//!
//! A single-use state machine taking one block from "height advanced" to
//! "fully persisted". Transitions carry their data as parameters; there
//! is no mutable shared state across suspension points.
//!
//! ```text
//! NEW → PREFETCHING → READY → EXECUTING → FINALIZING → COMPLETE
//!            │            │         │            │
//!            └──────── ABORTED ─────┴────────────┘
//!                         │
//!                      REVERTED (on failure or reorg)
//! ```

use crate::classify;
use crate::rpc::{BitcoinRpc, RpcError};
use opx_block::{BlockProcessor, CancelSignal, ProcessError, ProcessedBlock};
use shared_types::RawBlock;
use thiserror::Error;
use tracing::{debug, warn};

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Prefetching,
    Ready,
    Executing,
    Finalizing,
    Complete,
    Aborted,
    Reverted,
}

/// Task failures.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The requested transition is not legal from the current state.
    #[error("invalid transition from {state:?} during {operation}")]
    InvalidTransition {
        state: TaskState,
        operation: &'static str,
    },

    /// Prefetch failed against the base-chain RPC.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Block execution failed; the task must be reverted.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The cancellation signal was observed.
    #[error("task cancelled at height {0}")]
    Cancelled(u64),
}

/// A single-use, per-block indexing task. A refresh at the same height
/// is a new task.
pub struct IndexingTask {
    height: u64,
    state: TaskState,
    cancel: CancelSignal,
    block: Option<RawBlock>,
}

impl IndexingTask {
    #[must_use]
    pub fn new(height: u64) -> Self {
        Self {
            height,
            state: TaskState::New,
            cancel: CancelSignal::new(),
            block: None,
        }
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// The cancellation signal observed at safepoints.
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Hash of the prefetched block, once READY.
    #[must_use]
    pub fn block_hash(&self) -> Option<shared_types::Hash> {
        self.block.as_ref().map(|b| b.hash)
    }

    /// NEW → PREFETCHING → READY: fetch and deserialize the raw block,
    /// classifying second-layer payloads.
    pub async fn prefetch(&mut self, rpc: &dyn BitcoinRpc) -> Result<(), TaskError> {
        if self.state != TaskState::New {
            return Err(TaskError::InvalidTransition {
                state: self.state,
                operation: "prefetch",
            });
        }
        self.state = TaskState::Prefetching;

        let hash = rpc.get_block_hash(self.height).await.map_err(|err| {
            self.state = TaskState::Aborted;
            err
        })?;
        let mut block = rpc.get_block(&hash).await.map_err(|err| {
            self.state = TaskState::Aborted;
            err
        })?;
        if self.cancel.is_cancelled() {
            self.state = TaskState::Aborted;
            return Err(TaskError::Cancelled(self.height));
        }

        classify::classify_block(&mut block.transactions);
        debug!(
            height = self.height,
            tx_count = block.transactions.len(),
            "block prefetched"
        );
        self.block = Some(block);
        self.state = TaskState::Ready;
        Ok(())
    }

    /// READY → EXECUTING → FINALIZING: run the block processor. The
    /// processor's finalize is the atomic commit; once it returns, the
    /// task only has hook dispatch left.
    pub fn process(&mut self, processor: &BlockProcessor) -> Result<ProcessedBlock, TaskError> {
        if self.state != TaskState::Ready {
            return Err(TaskError::InvalidTransition {
                state: self.state,
                operation: "process",
            });
        }
        let Some(block) = self.block.take() else {
            return Err(TaskError::InvalidTransition {
                state: self.state,
                operation: "process (no block)",
            });
        };
        self.state = TaskState::Executing;

        match processor.process_block(block, &self.cancel) {
            Ok(processed) => {
                self.state = TaskState::Finalizing;
                Ok(processed)
            }
            Err(ProcessError::Cancelled) => {
                self.state = TaskState::Aborted;
                Err(TaskError::Cancelled(self.height))
            }
            Err(err) => {
                warn!(height = self.height, error = %err, "block execution failed");
                self.state = TaskState::Reverted;
                Err(TaskError::Process(err))
            }
        }
    }

    /// FINALIZING → COMPLETE, after hooks have been dispatched.
    pub fn complete(&mut self) -> Result<(), TaskError> {
        if self.state != TaskState::Finalizing {
            return Err(TaskError::InvalidTransition {
                state: self.state,
                operation: "complete",
            });
        }
        self.state = TaskState::Complete;
        Ok(())
    }

    /// Cooperative cancellation: any live state → ABORTED at the next
    /// safepoint.
    pub fn abort(&mut self) {
        self.cancel.cancel();
        if !matches!(
            self.state,
            TaskState::Complete | TaskState::Reverted | TaskState::Aborted
        ) {
            self.state = TaskState::Aborted;
        }
    }

    /// Mark the task reverted after an external rollback.
    pub fn mark_reverted(&mut self) {
        self.state = TaskState::Reverted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::FakeChain;

    fn block(height: u64) -> RawBlock {
        RawBlock {
            height,
            hash: [height as u8; 32],
            previous_block_hash: [height.wrapping_sub(1) as u8; 32],
            time: 0,
            median_time: 0,
            transactions: vec![],
        }
    }

    #[tokio::test]
    async fn test_prefetch_moves_to_ready() {
        let chain = FakeChain::new();
        chain.put_block(block(5));
        let mut task = IndexingTask::new(5);
        assert_eq!(task.state(), TaskState::New);

        task.prefetch(&chain).await.unwrap();
        assert_eq!(task.state(), TaskState::Ready);
    }

    #[tokio::test]
    async fn test_prefetch_twice_is_rejected() {
        let chain = FakeChain::new();
        chain.put_block(block(5));
        let mut task = IndexingTask::new(5);
        task.prefetch(&chain).await.unwrap();

        let err = task.prefetch(&chain).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_prefetch_missing_block_aborts() {
        let chain = FakeChain::new();
        let mut task = IndexingTask::new(5);
        assert!(task.prefetch(&chain).await.is_err());
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[tokio::test]
    async fn test_abort_is_observed_during_prefetch() {
        let chain = FakeChain::new();
        chain.put_block(block(5));
        let mut task = IndexingTask::new(5);
        task.abort();
        assert_eq!(task.state(), TaskState::Aborted);
        assert!(task.prefetch(&chain).await.is_err());
    }

    #[test]
    fn test_process_requires_ready() {
        // A NEW task has nothing to execute.
        let mut task = IndexingTask::new(5);
        assert_eq!(task.state(), TaskState::New);
        task.mark_reverted();
        assert_eq!(task.state(), TaskState::Reverted);
    }
}
