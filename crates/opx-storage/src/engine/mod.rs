//! # Storage Engine
//!
//! Typed repositories over a [`KeyValueBackend`]. Repository impls are
//! split per entity:
//!
//! - [`blocks`]: headers, hash/checksum lookups, range reads
//! - [`transactions`]: indexed transactions and the mempool store
//! - [`contracts`]: deployment records with bytecode compression
//! - [`state`]: height-versioned storage slots
//! - [`utxo`]: unspent outputs, tombstones, retention
//! - [`epochs`]: epoch windows and submissions
//! - [`metadata`]: chain tip, reorg audit records, block witnesses

pub mod blocks;
pub mod contracts;
pub mod epochs;
pub mod metadata;
pub mod state;
pub mod transactions;
pub mod utxo;

use crate::backend::{BatchOperation, KeyValueBackend};
use crate::error::StorageError;
use std::sync::Arc;

/// Accumulates the writes of one logical transaction.
///
/// Everything pushed into a context lands atomically on
/// [`StorageEngine::commit`], or not at all if the context is dropped.
#[derive(Debug, Default)]
pub struct WriteContext {
    ops: Vec<BatchOperation>,
}

impl WriteContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BatchOperation) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = BatchOperation>) {
        self.ops.extend(ops);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOperation> {
        self.ops
    }
}

/// The storage engine. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct StorageEngine {
    backend: Arc<dyn KeyValueBackend>,
}

impl StorageEngine {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    /// Commit a write context atomically.
    pub fn commit(&self, ctx: WriteContext) -> Result<(), StorageError> {
        if ctx.is_empty() {
            return Ok(());
        }
        self.backend.write_batch(ctx.into_ops())
    }

    /// Route ops into the caller's context, or apply them immediately as
    /// their own atomic batch when no context is given.
    pub(crate) fn apply(
        &self,
        ctx: Option<&mut WriteContext>,
        ops: Vec<BatchOperation>,
    ) -> Result<(), StorageError> {
        match ctx {
            Some(ctx) => {
                ctx.extend(ops);
                Ok(())
            }
            None => self.backend.write_batch(ops),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use crate::keys::Collection;

    #[test]
    fn test_context_writes_are_invisible_until_commit() {
        let engine = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let mut ctx = WriteContext::new();
        engine
            .apply(
                Some(&mut ctx),
                vec![BatchOperation::put(
                    Collection::Metadata,
                    b"k".to_vec(),
                    vec![1],
                )],
            )
            .unwrap();

        assert_eq!(engine.backend().get(Collection::Metadata, b"k").unwrap(), None);
        engine.commit(ctx).unwrap();
        assert_eq!(
            engine.backend().get(Collection::Metadata, b"k").unwrap(),
            Some(vec![1])
        );
    }

    #[test]
    fn test_dropped_context_writes_nothing() {
        let engine = StorageEngine::new(Arc::new(MemoryBackend::new()));
        {
            let mut ctx = WriteContext::new();
            ctx.push(BatchOperation::put(
                Collection::Metadata,
                b"gone".to_vec(),
                vec![9],
            ));
        }
        assert_eq!(engine.backend().get(Collection::Metadata, b"gone").unwrap(), None);
    }
}
