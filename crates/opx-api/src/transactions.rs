//! # Transaction Queries
//!
//! Indexed-transaction and mempool lookups with address filtering. An
//! address filter of length 1 is resolved as a public key and expanded
//! to every address encoding.

use crate::blocks::{receipt_dto, transaction_dto, ApiReceipt, ApiTransaction};
use crate::error::ApiError;
use crate::limits::ApiLimits;
use opx_storage::StorageEngine;
use shared_types::address::expand_public_key;
use shared_types::{encoding, Address, IndexerError};

/// Transaction query handlers.
#[derive(Clone)]
pub struct TransactionQueryService {
    storage: StorageEngine,
    limits: ApiLimits,
}

impl TransactionQueryService {
    #[must_use]
    pub fn new(storage: StorageEngine, limits: ApiLimits) -> Self {
        Self { storage, limits }
    }

    /// Indexed transaction by hash.
    pub fn get_transaction_by_hash(&self, hash_param: &str) -> Result<ApiTransaction, ApiError> {
        let hash = encoding::parse_hash_param(hash_param)
            .ok_or_else(|| ApiError::invalid_input("hash must be 64 hex characters"))?;
        let tx = self
            .storage
            .get_transaction_by_hash(&hash)
            .map_err(IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("transaction"))?;
        Ok(transaction_dto(&tx))
    }

    /// Receipt of an indexed transaction.
    pub fn get_transaction_receipt(&self, hash_param: &str) -> Result<ApiReceipt, ApiError> {
        let hash = encoding::parse_hash_param(hash_param)
            .ok_or_else(|| ApiError::invalid_input("hash must be 64 hex characters"))?;
        let tx = self
            .storage
            .get_transaction_by_hash(&hash)
            .map_err(IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("transaction"))?;
        receipt_dto(&tx).ok_or_else(|| ApiError::not_found("receipt"))
    }

    /// Pending transactions, filtered by recipient addresses.
    pub fn get_pending_transactions(
        &self,
        address_filter: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<ApiTransaction>, ApiError> {
        if address_filter.len() > self.limits.max_addresses {
            return Err(ApiError::invalid_input(format!(
                "at most {} addresses per filter",
                self.limits.max_addresses
            )));
        }
        let limit = limit
            .unwrap_or(self.limits.max_result_limit)
            .min(self.limits.max_result_limit);

        let addresses = self.resolve_filter(address_filter)?;
        let pending = self
            .storage
            .get_pending_for_addresses(&addresses, limit)
            .map_err(IndexerError::from)?;
        Ok(pending
            .iter()
            .map(|p| transaction_dto(&p.transaction))
            .collect())
    }

    /// One pending transaction by hash.
    pub fn get_pending_transaction(&self, hash_param: &str) -> Result<ApiTransaction, ApiError> {
        let hash = encoding::parse_hash_param(hash_param)
            .ok_or_else(|| ApiError::invalid_input("hash must be 64 hex characters"))?;
        let pending = self
            .storage
            .get_pending_transaction(&hash)
            .map_err(IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("pending transaction"))?;
        Ok(transaction_dto(&pending.transaction))
    }

    /// A single-entry filter is resolved as a public key and expanded to
    /// every encoding; multi-entry filters must be canonical addresses.
    fn resolve_filter(&self, filter: &[String]) -> Result<Vec<Address>, ApiError> {
        if filter.len() == 1 {
            let entry = &filter[0];
            if let Some(address) = Address::parse(entry) {
                return Ok(vec![address]);
            }
            let public_key = encoding::from_hex(entry)
                .map_err(|_| ApiError::invalid_input("filter entry is neither address nor hex public key"))?;
            if public_key.len() != 32 && public_key.len() != 33 {
                return Err(ApiError::invalid_input("public key must be 32 or 33 bytes"));
            }
            return Ok(expand_public_key(&public_key));
        }

        filter
            .iter()
            .map(|entry| {
                Address::parse(entry)
                    .ok_or_else(|| ApiError::invalid_input(format!("bad address: {entry}")))
            })
            .collect()
    }
}
