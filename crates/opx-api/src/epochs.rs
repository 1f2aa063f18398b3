//! # Epoch Preimage Endpoint
//!
//! Serves the epoch data of the current epoch minus two (the two-epoch
//! finalization delay). Responses are cached for ten seconds and the
//! cache is invalidated on block change.

use crate::error::ApiError;
use opx_storage::StorageEngine;
use serde::Serialize;
use shared_types::{encoding, Epoch, IndexerError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Finalization delay in epochs.
pub const PREIMAGE_DELAY_EPOCHS: u64 = 2;
/// Cache lifetime.
pub const PREIMAGE_CACHE_TTL: Duration = Duration::from_secs(10);

/// Verification block of the preimage response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiEpochVerification {
    pub epoch_hash: String,
    pub epoch_root: String,
    pub target_hash: String,
    pub start_block: u64,
    pub end_block: i64,
    pub proofs: Vec<crate::blocks::ApiChecksumProof>,
}

/// Wire form of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiEpochSubmission {
    pub submitter_public_key: String,
    /// Base64 solution bytes.
    pub solution: String,
    pub block_height: u64,
}

/// The preimage response. All fields absent when no epoch is final yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiPreimage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graffiti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<ApiEpochVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<ApiEpochSubmission>,
}

struct CacheEntry {
    produced_at: Instant,
    value: ApiPreimage,
}

/// Epoch query handlers.
pub struct EpochQueryService {
    storage: StorageEngine,
    cache: Mutex<Option<CacheEntry>>,
}

impl EpochQueryService {
    #[must_use]
    pub fn new(storage: StorageEngine) -> Self {
        Self {
            storage,
            cache: Mutex::new(None),
        }
    }

    /// The preimage of the epoch finalized two epochs ago. Empty before
    /// epoch 2 exists.
    pub fn get_preimage(&self) -> Result<ApiPreimage, ApiError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(entry) = cache.as_ref() {
                if entry.produced_at.elapsed() < PREIMAGE_CACHE_TTL {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = self.build_preimage()?;
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CacheEntry {
                produced_at: Instant::now(),
                value: value.clone(),
            });
        }
        Ok(value)
    }

    /// Invalidate the cache; called on every block change.
    pub fn on_block_change(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    fn build_preimage(&self) -> Result<ApiPreimage, ApiError> {
        let Some(current) = self
            .storage
            .get_latest_epoch()
            .map_err(IndexerError::from)?
        else {
            return Ok(ApiPreimage::default());
        };
        let Some(target_number) = current.number.checked_sub(PREIMAGE_DELAY_EPOCHS) else {
            return Ok(ApiPreimage::default());
        };
        let Some(epoch) = self
            .storage
            .get_epoch_by_number(target_number)
            .map_err(IndexerError::from)?
        else {
            return Ok(ApiPreimage::default());
        };

        let submission = self
            .storage
            .get_epoch_submissions(target_number)
            .map_err(IndexerError::from)?
            .into_iter()
            .find(|s| s.submitter_public_key == epoch.proposer_public_key)
            .map(|s| ApiEpochSubmission {
                submitter_public_key: encoding::to_hex(&s.submitter_public_key),
                solution: encoding::to_base64(&s.solution),
                block_height: s.block_height,
            });

        Ok(preimage_dto(&epoch, submission))
    }
}

fn preimage_dto(epoch: &Epoch, submission: Option<ApiEpochSubmission>) -> ApiPreimage {
    ApiPreimage {
        epoch_number: Some(epoch.number),
        public_key: Some(encoding::to_hex(&epoch.proposer_public_key)),
        solution: Some(encoding::to_base64(&epoch.solution)),
        salt: Some(encoding::to_hex(&epoch.salt)),
        graffiti: epoch.graffiti.as_ref().map(|g| encoding::to_base64(g)),
        difficulty: Some(epoch.difficulty),
        verification: Some(ApiEpochVerification {
            epoch_hash: encoding::to_hex(&epoch.epoch_hash),
            epoch_root: encoding::to_hex(&epoch.epoch_root),
            target_hash: encoding::to_hex(&epoch.target_hash),
            start_block: epoch.start_block,
            end_block: epoch.end_block,
            proofs: epoch
                .proofs
                .iter()
                .map(|entry| crate::blocks::ApiChecksumProof {
                    index: entry.index,
                    siblings: entry.siblings.iter().map(|s| encoding::to_hex(s)).collect(),
                })
                .collect(),
        }),
        submission,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_storage::MemoryBackend;
    use shared_types::EPOCH_OPEN_SENTINEL;
    use std::sync::Arc;

    fn epoch(number: u64, start: u64, end: i64) -> Epoch {
        Epoch {
            number,
            proposer_public_key: vec![2u8; 33],
            solution: vec![0xAB, 0xCD],
            salt: [number as u8; 32],
            graffiti: None,
            difficulty: 7,
            start_block: start,
            end_block: end,
            epoch_hash: [number as u8; 32],
            epoch_root: [0u8; 32],
            target_hash: [0u8; 32],
            proofs: vec![],
        }
    }

    fn service_with_epochs(latest: u64) -> EpochQueryService {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        for number in 0..=latest {
            let end = if number == latest {
                EPOCH_OPEN_SENTINEL
            } else {
                (number * 5 + 4) as i64
            };
            storage.save_epoch(&epoch(number, number * 5, end), None).unwrap();
        }
        EpochQueryService::new(storage)
    }

    #[test]
    fn test_two_epoch_delay() {
        let service = service_with_epochs(4);
        let preimage = service.get_preimage().unwrap();
        assert_eq!(preimage.epoch_number, Some(2));
    }

    #[test]
    fn test_empty_before_epoch_two() {
        let service = service_with_epochs(1);
        let preimage = service.get_preimage().unwrap();
        assert_eq!(preimage, ApiPreimage::default());
    }

    #[test]
    fn test_cache_serves_until_invalidated() {
        let service = service_with_epochs(4);
        let first = service.get_preimage().unwrap();

        // A newer epoch lands behind the cache's back.
        service.storage.save_epoch(&epoch(5, 25, EPOCH_OPEN_SENTINEL), None).unwrap();
        let cached = service.get_preimage().unwrap();
        assert_eq!(cached, first);

        // Block change invalidates; the next read observes epoch 3.
        service.on_block_change();
        let fresh = service.get_preimage().unwrap();
        assert_eq!(fresh.epoch_number, Some(3));
    }
}
