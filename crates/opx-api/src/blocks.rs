//! # Block Queries
//!
//! Lookup by height, base-chain hash, or checksum root. Hash and
//! checksum lookups are distinct operations over distinct indexes.

use crate::error::ApiError;
use opx_storage::StorageEngine;
use serde::Serialize;
use shared_types::{encoding, Block, BlockHeader, ReceiptStatus, Transaction};

/// Wire form of a checksum proof entry.
#[derive(Debug, Clone, Serialize)]
pub struct ApiChecksumProof {
    pub index: u32,
    pub siblings: Vec<String>,
}

/// Wire form of a contract event.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEvent {
    pub contract: String,
    pub topic: String,
    /// Base64 event data.
    pub data: String,
}

/// Wire form of a transaction receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ApiReceipt {
    pub status: String,
    /// Base64 result bytes.
    pub result: String,
    pub events: Vec<ApiEvent>,
    /// Hex gas consumed.
    pub gas_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert: Option<String>,
    pub deployed_contracts: Vec<String>,
}

/// Wire form of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTransaction {
    pub id: String,
    pub hash: String,
    pub kind: String,
    pub block_height: u64,
    pub index_in_block: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ApiReceipt>,
}

/// Wire form of a block.
#[derive(Debug, Clone, Serialize)]
pub struct ApiBlock {
    pub height: u64,
    pub hash: String,
    pub previous_block_hash: String,
    pub previous_block_checksum: String,
    pub storage_root: String,
    pub receipt_root: String,
    pub checksum_root: String,
    pub checksum_proofs: Vec<ApiChecksumProof>,
    pub time: u64,
    pub median_time: u64,
    pub tx_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<ApiTransaction>>,
}

pub(crate) fn receipt_dto(tx: &Transaction) -> Option<ApiReceipt> {
    tx.receipt.as_ref().map(|receipt| {
        let (status, revert) = match &receipt.status {
            ReceiptStatus::Success => ("success", None),
            ReceiptStatus::Reverted(reason) => ("reverted", Some(encoding::to_base64(reason))),
            ReceiptStatus::OutOfGas => ("out_of_gas", None),
        };
        ApiReceipt {
            status: status.to_string(),
            result: encoding::to_base64(&receipt.result),
            events: receipt
                .events
                .iter()
                .map(|event| ApiEvent {
                    contract: event.contract.to_string(),
                    topic: event.topic.clone(),
                    data: encoding::to_base64(&event.data),
                })
                .collect(),
            gas_used: encoding::u64_to_hex(receipt.gas_used),
            revert,
            deployed_contracts: receipt
                .deployed_contracts
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    })
}

pub(crate) fn transaction_dto(tx: &Transaction) -> ApiTransaction {
    ApiTransaction {
        id: encoding::to_hex(&tx.id),
        hash: encoding::to_hex(&tx.hash),
        kind: format!("{:?}", tx.kind).to_lowercase(),
        block_height: tx.block_height,
        index_in_block: tx.index_in_block,
        contract: tx.interaction.as_ref().map(|i| i.contract.to_string()),
        receipt: receipt_dto(tx),
    }
}

fn block_dto(header: &BlockHeader, transactions: Option<&[Transaction]>) -> ApiBlock {
    ApiBlock {
        height: header.height,
        hash: encoding::to_hex(&header.hash),
        previous_block_hash: encoding::to_hex(&header.previous_block_hash),
        previous_block_checksum: encoding::to_hex(&header.previous_block_checksum),
        storage_root: encoding::to_hex(&header.storage_root),
        receipt_root: encoding::to_hex(&header.receipt_root),
        checksum_root: encoding::to_hex(&header.checksum_root),
        checksum_proofs: header
            .checksum_proofs
            .iter()
            .map(|entry| ApiChecksumProof {
                index: entry.index,
                siblings: entry.siblings.iter().map(|s| encoding::to_hex(s)).collect(),
            })
            .collect(),
        time: header.time,
        median_time: header.median_time,
        tx_count: header.tx_count,
        transactions: transactions.map(|txs| txs.iter().map(transaction_dto).collect()),
    }
}

/// Block query handlers.
#[derive(Clone)]
pub struct BlockQueryService {
    storage: StorageEngine,
}

impl BlockQueryService {
    #[must_use]
    pub fn new(storage: StorageEngine) -> Self {
        Self { storage }
    }

    /// The block at the chain tip.
    pub fn get_latest_block(&self) -> Result<ApiBlock, ApiError> {
        let header = self
            .storage
            .get_latest_block()
            .map_err(shared_types::IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("block"))?;
        Ok(block_dto(&header, None))
    }

    /// Block at a height.
    pub fn get_block_by_height(
        &self,
        height: u64,
        include_transactions: bool,
    ) -> Result<ApiBlock, ApiError> {
        let header = self
            .storage
            .get_block_header(height)
            .map_err(shared_types::IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("block"))?;
        self.with_transactions(header, include_transactions)
    }

    /// Block by base-chain hash.
    pub fn get_block_by_hash(
        &self,
        hash_param: &str,
        include_transactions: bool,
    ) -> Result<ApiBlock, ApiError> {
        let hash = encoding::parse_hash_param(hash_param)
            .ok_or_else(|| ApiError::invalid_input("hash must be 64 hex characters"))?;
        let header = self
            .storage
            .get_block_by_hash(&hash)
            .map_err(shared_types::IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("block"))?;
        self.with_transactions(header, include_transactions)
    }

    /// Block by checksum root. The parameter is lowercased, a leading
    /// `0x` stripped, and anything that is not 64 hex characters
    /// rejected.
    pub fn get_block_by_checksum(
        &self,
        checksum_param: &str,
        include_transactions: bool,
    ) -> Result<ApiBlock, ApiError> {
        let checksum = encoding::parse_hash_param(checksum_param)
            .ok_or_else(|| ApiError::invalid_input("checksum must be 64 hex characters"))?;
        let header = self
            .storage
            .get_block_by_checksum(&checksum)
            .map_err(shared_types::IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("block"))?;
        self.with_transactions(header, include_transactions)
    }

    /// Full block with transactions.
    pub fn get_block(&self, height: u64) -> Result<Block, ApiError> {
        let header = self
            .storage
            .get_block_header(height)
            .map_err(shared_types::IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("block"))?;
        let transactions = self
            .storage
            .get_transactions_by_height(height)
            .map_err(shared_types::IndexerError::from)?;
        Ok(Block {
            header,
            transactions,
        })
    }

    fn with_transactions(
        &self,
        header: BlockHeader,
        include: bool,
    ) -> Result<ApiBlock, ApiError> {
        if !include {
            return Ok(block_dto(&header, None));
        }
        let transactions = self
            .storage
            .get_transactions_by_height(header.height)
            .map_err(shared_types::IndexerError::from)?;
        Ok(block_dto(&header, Some(&transactions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_storage::MemoryBackend;
    use std::sync::Arc;

    fn service_with_block() -> (BlockQueryService, BlockHeader) {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let header = BlockHeader {
            height: 10,
            hash: [0xAB; 32],
            previous_block_hash: [0xAA; 32],
            previous_block_checksum: [1u8; 32],
            storage_root: [2u8; 32],
            receipt_root: [3u8; 32],
            checksum_root: [0xCD; 32],
            checksum_proofs: vec![],
            pow_preimage: None,
            time: 1_700_000_000,
            median_time: 1_699_999_000,
            tx_count: 0,
        };
        storage.save_block_header(&header, None).unwrap();
        (BlockQueryService::new(storage), header)
    }

    #[test]
    fn test_lookup_by_height_and_hash() {
        let (service, header) = service_with_block();
        let by_height = service.get_block_by_height(10, false).unwrap();
        assert_eq!(by_height.hash, encoding::to_hex(&header.hash));

        let by_hash = service
            .get_block_by_hash(&encoding::to_hex(&header.hash), false)
            .unwrap();
        assert_eq!(by_hash.height, 10);
    }

    #[test]
    fn test_checksum_lookup_normalizes_parameter() {
        let (service, _) = service_with_block();
        // Uppercase with 0x prefix still resolves.
        let param = format!("0x{}", "CD".repeat(32));
        let block = service.get_block_by_checksum(&param, false).unwrap();
        assert_eq!(block.height, 10);
    }

    #[test]
    fn test_checksum_lookup_rejects_malformed() {
        let (service, _) = service_with_block();
        let err = service.get_block_by_checksum("0x1234", false).unwrap_err();
        assert_eq!(err.code, "INVALID_INPUT");
    }

    #[test]
    fn test_missing_block_is_not_found() {
        let (service, _) = service_with_block();
        let err = service.get_block_by_height(999, false).unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }
}
