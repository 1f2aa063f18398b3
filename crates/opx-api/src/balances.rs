//! # Balance and Unspent Queries
//!
//! Thin handlers over the UTXO ledger's aggregation queries.

use crate::error::ApiError;
use crate::limits::ApiLimits;
use opx_utxo::UtxoLedger;
use serde::Serialize;
use shared_types::{encoding, Address, IndexerError};

/// Wire form of one unspent output.
#[derive(Debug, Clone, Serialize)]
pub struct ApiUnspentOutput {
    pub tx_id: String,
    pub output_index: u32,
    /// Hex value in satoshis.
    pub value: String,
    pub block_height: u64,
}

/// Balance / unspent query handlers.
#[derive(Clone)]
pub struct BalanceQueryService {
    ledger: UtxoLedger,
    limits: ApiLimits,
}

impl BalanceQueryService {
    #[must_use]
    pub fn new(ledger: UtxoLedger, limits: ApiLimits) -> Self {
        Self { ledger, limits }
    }

    /// Balance of an address over its live outputs.
    pub fn get_balance(&self, address: &str, filter_ordinals: bool) -> Result<String, ApiError> {
        let address = parse_address(address)?;
        let balance = self
            .ledger
            .balance_of(&address, filter_ordinals)
            .map_err(IndexerError::from)?;
        Ok(encoding::u64_to_hex(balance))
    }

    /// Live outputs of an address.
    pub fn get_unspent(
        &self,
        address: &str,
        optimize: bool,
        limit: Option<usize>,
    ) -> Result<Vec<ApiUnspentOutput>, ApiError> {
        let address = parse_address(address)?;
        let limit = limit
            .unwrap_or(self.limits.max_result_limit)
            .min(self.limits.max_result_limit);
        let outputs = self
            .ledger
            .unspent_of(&address, optimize, limit)
            .map_err(IndexerError::from)?;
        Ok(outputs
            .iter()
            .map(|output| ApiUnspentOutput {
                tx_id: encoding::to_hex(&output.tx_id),
                output_index: output.output_index,
                value: encoding::u64_to_hex(output.value),
                block_height: output.block_height,
            })
            .collect())
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::parse(raw).ok_or_else(|| ApiError::invalid_input(format!("bad address: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_storage::{MemoryBackend, StorageEngine};
    use opx_utxo::UtxoConfig;
    use shared_types::{AddressKind, UnspentOutput};
    use std::sync::Arc;

    fn service() -> (BalanceQueryService, StorageEngine, Address) {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let ledger = UtxoLedger::new(storage.clone(), UtxoConfig::default());
        let address = Address::new(AddressKind::P2wpkh, vec![0x42; 20]);
        (
            BalanceQueryService::new(ledger, ApiLimits::default()),
            storage,
            address,
        )
    }

    #[test]
    fn test_balance_and_unspent() {
        let (service, storage, address) = service();
        storage
            .upsert_unspent_outputs(
                &[UnspentOutput {
                    tx_id: [1u8; 32],
                    output_index: 0,
                    value: 5_000,
                    script_pub_key: vec![],
                    address: Some(address.clone()),
                    block_height: 10,
                    deleted_at_block: None,
                }],
                None,
            )
            .unwrap();

        assert_eq!(service.get_balance(&address.to_string(), false).unwrap(), "0x1388");
        let outputs = service.get_unspent(&address.to_string(), true, None).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].value, "0x1388");
    }

    #[test]
    fn test_bad_address_rejected() {
        let (service, _, _) = service();
        let err = service.get_balance("nonsense", false).unwrap_err();
        assert_eq!(err.code, "INVALID_INPUT");
    }
}
