//! # Storage Engine
//!
//! Persistent repositories for blocks, transactions, contracts, unspent
//! outputs, state slots, and epochs.
//!
//! ## Architecture
//!
//! The engine is a thin typed layer over a [`backend::KeyValueBackend`]:
//! RocksDB in production, a `BTreeMap` store in tests. Every repository
//! write accepts an optional [`WriteContext`]; writes accumulated into one
//! context are committed as a single atomic batch, so concurrent readers
//! see either the pre- or post-image, never partial state.
//!
//! ## Ownership
//!
//! The engine exclusively owns persisted state. Block execution holds a
//! block-scoped `WriteContext` that is promoted on finalize or dropped on
//! revert.

pub mod backend;
pub mod backends;
pub mod engine;
pub mod error;
pub mod keys;

pub use backend::{BatchOperation, KeyValueBackend};
pub use backends::memory::MemoryBackend;
pub use backends::rocks::RocksBackend;
pub use engine::state::SlotWrite;
pub use engine::{StorageEngine, WriteContext};
pub use error::StorageError;
pub use keys::Collection;
