//! # Hook Events
//!
//! The tagged event taxonomy delivered to plugins.

use serde::{Deserialize, Serialize};
use shared_types::{BlockProcessedData, Hash, MempoolTransaction};

/// Event kinds, used to look up dispatch behavior and permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    BlockPreProcess,
    BlockPostProcess,
    BlockChange,
    EpochChange,
    EpochFinalized,
    MempoolTransaction,
    Reorg,
    ReindexRequired,
    PurgeBlocks,
    Load,
    Unload,
    Enable,
    Disable,
}

impl HookKind {
    /// Permission tag a plugin must carry to receive this event.
    #[must_use]
    pub fn required_permission(&self) -> &'static str {
        match self {
            Self::BlockPreProcess => "blocks.onPreProcess",
            Self::BlockPostProcess => "blocks.onPostProcess",
            Self::BlockChange => "blocks.onChange",
            Self::EpochChange => "epochs.onChange",
            Self::EpochFinalized => "epochs.onFinalized",
            Self::MempoolTransaction => "mempool.onTransaction",
            Self::Reorg => "chain.onReorg",
            Self::ReindexRequired => "chain.onReindex",
            Self::PurgeBlocks => "chain.onPurge",
            // Lifecycle events go to every plugin.
            Self::Load | Self::Unload | Self::Enable | Self::Disable => "",
        }
    }
}

/// A hook event with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HookEvent {
    /// A block is about to be executed.
    BlockPreProcess { height: u64, hash: Hash },
    /// A block finished execution but is not yet announced.
    BlockPostProcess(BlockProcessedData),
    /// A block is fully persisted; plugins observe these in height order.
    BlockChange(BlockProcessedData),
    /// A new epoch window opened.
    EpochChange { number: u64, start_block: u64 },
    /// An epoch window closed.
    EpochFinalized { number: u64, end_block: u64 },
    /// A transaction entered the mempool.
    MempoolTransaction(MempoolTransaction),
    /// The chain reorganized. Sequential, blocking, never dropped.
    Reorg {
        from_block: u64,
        to_block: u64,
        reason: String,
    },
    /// The indexer requires a reindex; the boolean result of each plugin
    /// is inspected (`true` = handled).
    ReindexRequired { from_height: u64 },
    /// Blocks below a height were purged.
    PurgeBlocks { before_height: u64 },
    /// Lifecycle.
    Load,
    Unload,
    Enable,
    Disable,
}

impl HookEvent {
    /// This event's kind.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        match self {
            Self::BlockPreProcess { .. } => HookKind::BlockPreProcess,
            Self::BlockPostProcess(_) => HookKind::BlockPostProcess,
            Self::BlockChange(_) => HookKind::BlockChange,
            Self::EpochChange { .. } => HookKind::EpochChange,
            Self::EpochFinalized { .. } => HookKind::EpochFinalized,
            Self::MempoolTransaction(_) => HookKind::MempoolTransaction,
            Self::Reorg { .. } => HookKind::Reorg,
            Self::ReindexRequired { .. } => HookKind::ReindexRequired,
            Self::PurgeBlocks { .. } => HookKind::PurgeBlocks,
            Self::Load => HookKind::Load,
            Self::Unload => HookKind::Unload,
            Self::Enable => HookKind::Enable,
            Self::Disable => HookKind::Disable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let event = HookEvent::Reorg {
            from_block: 200,
            to_block: 201,
            reason: "tip mismatch".into(),
        };
        assert_eq!(event.kind(), HookKind::Reorg);
        assert_eq!(event.kind().required_permission(), "chain.onReorg");
    }

    #[test]
    fn test_lifecycle_has_no_permission_gate() {
        assert_eq!(HookKind::Load.required_permission(), "");
    }
}
