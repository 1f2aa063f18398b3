//! # Contract Repository
//!
//! Deployment records keyed by contract address. Bytecode is stored
//! zstd-compressed when compression actually shrinks it. Inserting an
//! existing address fails with `Duplicate`, which maps to the domain
//! `AlreadyExists` and is never retried.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use serde::{Deserialize, Serialize};
use shared_types::{ContractAddress, ContractInformation};

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct ContractRecord {
    info: ContractInformation,
    compressed: bool,
}

fn encode_contract(info: &ContractInformation) -> Result<Vec<u8>, StorageError> {
    let compressed_bytecode = zstd::encode_all(info.bytecode.as_slice(), ZSTD_LEVEL)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;

    let record = if compressed_bytecode.len() < info.bytecode.len() {
        let mut stored = info.clone();
        stored.bytecode = compressed_bytecode;
        ContractRecord {
            info: stored,
            compressed: true,
        }
    } else {
        ContractRecord {
            info: info.clone(),
            compressed: false,
        }
    };
    Ok(bincode::serialize(&record)?)
}

fn decode_contract(bytes: &[u8]) -> Result<ContractInformation, StorageError> {
    let record: ContractRecord = bincode::deserialize(bytes)?;
    if !record.compressed {
        return Ok(record.info);
    }
    let mut info = record.info;
    info.bytecode = zstd::decode_all(info.bytecode.as_slice())
        .map_err(|err| StorageError::Corruption {
            collection: Collection::Contracts.name().to_string(),
            detail: format!("bytecode decompression failed: {err}"),
        })?;
    Ok(info)
}

impl StorageEngine {
    /// Insert a new contract. Rejects duplicates.
    pub fn insert_contract(
        &self,
        info: &ContractInformation,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        if self
            .backend()
            .get(Collection::Contracts, info.address.as_bytes())?
            .is_some()
        {
            return Err(StorageError::Duplicate {
                collection: Collection::Contracts.name().to_string(),
                key: info.address.to_string(),
            });
        }

        let mut height_key = keys::height_key(info.deployed_at_height).to_vec();
        height_key.extend_from_slice(info.address.as_bytes());

        self.apply(
            ctx,
            vec![
                BatchOperation::put(
                    Collection::Contracts,
                    info.address.as_bytes().to_vec(),
                    encode_contract(info)?,
                ),
                BatchOperation::put(
                    Collection::ContractByTweaked,
                    info.tweaked_public_key.clone(),
                    info.address.as_bytes().to_vec(),
                ),
                BatchOperation::put(Collection::ContractByHeight, height_key, Vec::new()),
            ],
        )
    }

    /// Contract at `address`, visible only if deployed at or below
    /// `at_height` (when given).
    pub fn get_contract(
        &self,
        address: &ContractAddress,
        at_height: Option<u64>,
    ) -> Result<Option<ContractInformation>, StorageError> {
        let Some(bytes) = self.backend().get(Collection::Contracts, address.as_bytes())? else {
            return Ok(None);
        };
        let info = decode_contract(&bytes)?;
        if let Some(height) = at_height {
            if info.deployed_at_height > height {
                return Ok(None);
            }
        }
        Ok(Some(info))
    }

    /// Contract lookup by tweaked public key.
    pub fn get_contract_by_tweaked_pubkey(
        &self,
        tweaked: &[u8],
    ) -> Result<Option<ContractInformation>, StorageError> {
        let Some(address_bytes) = self.backend().get(Collection::ContractByTweaked, tweaked)?
        else {
            return Ok(None);
        };
        let address = ContractAddress::new(
            String::from_utf8(address_bytes)
                .map_err(|_| StorageError::Corruption {
                    collection: Collection::ContractByTweaked.name().to_string(),
                    detail: "non-utf8 address pointer".into(),
                })?,
        );
        self.get_contract(&address, None)
    }

    /// Delete every contract deployed at or above `from_height`.
    pub fn delete_contracts_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self.backend().scan_range(
            Collection::ContractByHeight,
            &keys::height_key(from_height),
            &[0xFF; 9],
        )?;

        let mut ops = Vec::with_capacity(entries.len() * 3);
        for (key, _) in entries {
            let address_bytes = key[8..].to_vec();
            if let Some(record) = self.backend().get(Collection::Contracts, &address_bytes)? {
                let info = decode_contract(&record)?;
                ops.push(BatchOperation::delete(
                    Collection::ContractByTweaked,
                    info.tweaked_public_key,
                ));
            }
            ops.push(BatchOperation::delete(Collection::Contracts, address_bytes));
            ops.push(BatchOperation::delete(Collection::ContractByHeight, key));
        }
        self.apply(ctx, ops)
    }
}
