//! # Indexer
//!
//! The block indexing pipeline: a per-block single-use task state
//! machine, a scheduler that overlaps prefetch with execution, and the
//! chain observer that detects base-chain reorganizations and drives
//! rollback.
//!
//! ## Data flow
//!
//! The observer advances a target height; the scheduler prefetches raw
//! blocks (bounded by the pending-block threshold), executes them in
//! strictly increasing height order through the block processor, and
//! fans out hooks. A reorg cancels in-flight tasks above the fork point,
//! rolls storage back, and dispatches the blocking `Reorg` hook before
//! indexing resumes.

pub mod classify;
pub mod observer;
pub mod reorg;
pub mod rpc;
pub mod scheduler;
pub mod task;

pub use observer::{ChainObserver, Observation, ObserverError};
pub use reorg::{execute_reorg, ReorgError};
pub use rpc::{BitcoinRpc, JsonRpcClient, RpcConfig, RpcError};
pub use scheduler::{IndexerScheduler, SchedulerConfig, SchedulerError};
pub use task::{IndexingTask, TaskError, TaskState};
