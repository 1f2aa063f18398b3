//! # Chain Observer / Reorg Detector
//!
//! Polls the base-chain RPC for new tips and re-checks the parent chain
//! of the last K persisted headers. A reorg is detected when the
//! canonical hash at a height differs from the persisted one; the fork
//! point is the highest common ancestor.

use crate::rpc::{BitcoinRpc, RpcError};
use opx_storage::{StorageEngine, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// What one observation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The persisted tip matches the base chain.
    UpToDate,
    /// New base-chain blocks to index, up to `target`.
    Advance { target: u64 },
    /// The base chain replaced persisted blocks.
    Reorg {
        /// Highest common ancestor.
        fork_point: u64,
        /// Old persisted tip, all of it above the fork.
        old_tip: u64,
        reason: String,
    },
}

/// Observer failures.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The fork reaches below the configured reorg horizon. Fatal;
    /// surfaced to the operator.
    #[error("reorg deeper than horizon: fork below height {horizon_floor}")]
    ReorgTooDeep { horizon_floor: u64 },
}

/// Watches the base chain for advancement and reorganizations.
pub struct ChainObserver {
    rpc: Arc<dyn BitcoinRpc>,
    storage: StorageEngine,
    /// How many recent headers are re-checked each observation.
    reorg_depth: u64,
}

impl ChainObserver {
    #[must_use]
    pub fn new(rpc: Arc<dyn BitcoinRpc>, storage: StorageEngine, reorg_depth: u64) -> Self {
        Self {
            rpc,
            storage,
            reorg_depth,
        }
    }

    /// One observation round.
    pub async fn observe(&self) -> Result<Observation, ObserverError> {
        let target = self.rpc.get_block_count().await?;
        let Some(tip) = self.storage.max_block_height()? else {
            // Nothing persisted yet; everything up to the target is new.
            return Ok(if target > 0 {
                Observation::Advance { target }
            } else {
                Observation::UpToDate
            });
        };

        // Re-check the last K persisted headers against the canonical
        // chain, highest first.
        let floor = tip.saturating_sub(self.reorg_depth.saturating_sub(1));
        let mut mismatch: Option<u64> = None;
        for height in (floor..=tip).rev() {
            let Some(persisted) = self.storage.get_block_header(height)? else {
                continue;
            };
            match self.rpc.get_block_hash(height).await {
                Ok(canonical) if canonical == persisted.hash => {
                    if mismatch.is_none() {
                        break;
                    }
                    // First match below a mismatch: the fork point.
                    return Ok(Observation::Reorg {
                        fork_point: height,
                        old_tip: tip,
                        reason: format!("canonical hash diverges above height {height}"),
                    });
                }
                Ok(_) => {
                    warn!(height, "persisted hash differs from canonical chain");
                    mismatch = Some(height);
                }
                Err(RpcError::NotFound(_)) => {
                    // The canonical chain is shorter than our tip.
                    mismatch = Some(height);
                }
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(deepest) = mismatch {
            // Every re-checked header diverged: the fork is at or below
            // the horizon floor.
            if deepest <= floor {
                return Err(ObserverError::ReorgTooDeep {
                    horizon_floor: floor,
                });
            }
            return Ok(Observation::Reorg {
                fork_point: floor.saturating_sub(1),
                old_tip: tip,
                reason: format!("divergence down to height {deepest}"),
            });
        }

        if target > tip {
            info!(tip, target, "base chain advanced");
            Ok(Observation::Advance { target })
        } else {
            Ok(Observation::UpToDate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::FakeChain;
    use opx_storage::MemoryBackend;
    use shared_types::{BlockHeader, RawBlock};

    fn header(height: u64, hash: [u8; 32]) -> BlockHeader {
        BlockHeader {
            height,
            hash,
            previous_block_hash: [0u8; 32],
            previous_block_checksum: [0u8; 32],
            storage_root: [0u8; 32],
            receipt_root: [0u8; 32],
            checksum_root: [height as u8 + 50; 32],
            checksum_proofs: vec![],
            pow_preimage: None,
            time: 0,
            median_time: 0,
            tx_count: 0,
        }
    }

    fn chain_block(height: u64, hash: [u8; 32]) -> RawBlock {
        RawBlock {
            height,
            hash,
            previous_block_hash: [0u8; 32],
            time: 0,
            median_time: 0,
            transactions: vec![],
        }
    }

    fn setup(persisted: &[(u64, [u8; 32])], canonical: &[(u64, [u8; 32])]) -> ChainObserver {
        let storage = StorageEngine::new(std::sync::Arc::new(MemoryBackend::new()));
        for &(height, hash) in persisted {
            storage.save_block_header(&header(height, hash), None).unwrap();
        }
        let rpc = Arc::new(FakeChain::new());
        for &(height, hash) in canonical {
            rpc.put_block(chain_block(height, hash));
        }
        ChainObserver::new(rpc, storage, 3)
    }

    #[tokio::test]
    async fn test_up_to_date() {
        let observer = setup(
            &[(1, [1u8; 32]), (2, [2u8; 32])],
            &[(1, [1u8; 32]), (2, [2u8; 32])],
        );
        assert_eq!(observer.observe().await.unwrap(), Observation::UpToDate);
    }

    #[tokio::test]
    async fn test_advance_detected() {
        let observer = setup(
            &[(1, [1u8; 32])],
            &[(1, [1u8; 32]), (2, [2u8; 32]), (3, [3u8; 32])],
        );
        assert_eq!(
            observer.observe().await.unwrap(),
            Observation::Advance { target: 3 }
        );
    }

    #[tokio::test]
    async fn test_reorg_fork_point_found() {
        // Heights 1-3 persisted; canonical replaces 3 (and extends).
        let observer = setup(
            &[(1, [1u8; 32]), (2, [2u8; 32]), (3, [3u8; 32])],
            &[
                (1, [1u8; 32]),
                (2, [2u8; 32]),
                (3, [0xAA; 32]),
                (4, [0xAB; 32]),
            ],
        );
        let observation = observer.observe().await.unwrap();
        assert_eq!(
            observation,
            Observation::Reorg {
                fork_point: 2,
                old_tip: 3,
                reason: "canonical hash diverges above height 2".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_reorg_at_horizon_is_accepted() {
        // Depth 3, tip 5: heights 3..=5 are re-checked. Divergence at 4
        // with a match at 3 is inside the horizon.
        let observer = setup(
            &[
                (1, [1u8; 32]),
                (2, [2u8; 32]),
                (3, [3u8; 32]),
                (4, [4u8; 32]),
                (5, [5u8; 32]),
            ],
            &[
                (1, [1u8; 32]),
                (2, [2u8; 32]),
                (3, [3u8; 32]),
                (4, [0xAA; 32]),
                (5, [0xAB; 32]),
            ],
        );
        let observation = observer.observe().await.unwrap();
        assert!(matches!(observation, Observation::Reorg { fork_point: 3, .. }));
    }

    #[tokio::test]
    async fn test_reorg_past_horizon_is_fatal() {
        // Every re-checked header diverges: fork below the horizon.
        let observer = setup(
            &[
                (1, [1u8; 32]),
                (2, [2u8; 32]),
                (3, [3u8; 32]),
                (4, [4u8; 32]),
                (5, [5u8; 32]),
            ],
            &[
                (1, [1u8; 32]),
                (2, [0x99; 32]),
                (3, [0xAA; 32]),
                (4, [0xAB; 32]),
                (5, [0xAC; 32]),
            ],
        );
        assert!(matches!(
            observer.observe().await.unwrap_err(),
            ObserverError::ReorgTooDeep { .. }
        ));
    }
}
