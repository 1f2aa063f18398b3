//! # State Queries
//!
//! Contract bytecode lookup and simulated execution (`call`) through the
//! read-only evaluator pool.

use crate::error::ApiError;
use crate::limits::ApiLimits;
use opx_storage::StorageEngine;
use opx_vm::{
    EvaluationError, EvaluationOutcome, EvaluationParams, EvaluatorPool, SlotMap,
};
use serde::Serialize;
use shared_types::{encoding, ContractAddress, IndexerError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wire form of `get_code`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCode {
    /// Base64 bytecode.
    pub bytecode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer_public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweaked_public_key: Option<String>,
}

/// Wire form of a simulated call.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCallResult {
    /// Base64 result bytes.
    pub result: String,
    pub events: Vec<crate::blocks::ApiEvent>,
    /// Hex gas consumed.
    pub gas_used: String,
    /// contract → { base64 pointer → base64 value } written by the call.
    pub changed_storage: BTreeMap<String, BTreeMap<String, String>>,
    /// contract → { base64 pointer → base64 value } read by the call.
    pub loaded_storage: BTreeMap<String, BTreeMap<String, String>>,
    /// Base64 revert reason, when the call did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert: Option<String>,
    pub deployed_contracts: Vec<String>,
}

/// State query handlers.
#[derive(Clone)]
pub struct StateQueryService {
    storage: StorageEngine,
    pool: Arc<EvaluatorPool>,
    limits: ApiLimits,
}

impl StateQueryService {
    #[must_use]
    pub fn new(storage: StorageEngine, pool: Arc<EvaluatorPool>, limits: ApiLimits) -> Self {
        Self {
            storage,
            pool,
            limits,
        }
    }

    /// Contract bytecode (and deployment metadata unless
    /// `only_bytecode`).
    pub fn get_code(&self, address: &str, only_bytecode: bool) -> Result<ApiCode, ApiError> {
        let address = ContractAddress::new(address);
        let info = self
            .storage
            .get_contract(&address, None)
            .map_err(IndexerError::from)?
            .ok_or_else(|| ApiError::not_found("contract"))?;

        if only_bytecode {
            return Ok(ApiCode {
                bytecode: encoding::to_base64(&info.bytecode),
                contract_address: None,
                deployed_at_height: None,
                deployer_public_key: None,
                tweaked_public_key: None,
            });
        }
        Ok(ApiCode {
            bytecode: encoding::to_base64(&info.bytecode),
            contract_address: Some(info.address.to_string()),
            deployed_at_height: Some(info.deployed_at_height),
            deployer_public_key: Some(encoding::to_hex(&info.deployer_public_key)),
            tweaked_public_key: Some(encoding::to_hex(&info.tweaked_public_key)),
        })
    }

    /// Simulated execution against current state. Never mutates
    /// persisted state; an unknown contract is `NOT_FOUND`.
    pub fn call(
        &self,
        contract: &str,
        calldata_hex: &str,
        gas_limit: Option<u64>,
        at_height: Option<u64>,
        preloaded: Option<BTreeMap<String, BTreeMap<String, String>>>,
    ) -> Result<ApiCallResult, ApiError> {
        let calldata = encoding::from_hex(calldata_hex)
            .map_err(|_| ApiError::invalid_input("calldata must be hex"))?;

        let mut params = EvaluationParams::call(
            ContractAddress::new(contract),
            calldata,
            gas_limit.unwrap_or(1_000_000_000),
        );
        params.block.height = match at_height {
            Some(height) => height,
            None => self
                .storage
                .max_block_height()
                .map_err(IndexerError::from)?
                .unwrap_or(0),
        };
        if let Some(preloaded) = preloaded {
            params.preloaded_storage = decode_preloaded(&preloaded)?;
        }

        let result = match self.pool.view(&params) {
            Ok(result) => result,
            Err(EvaluationError::MissingContract(_)) => {
                return Err(ApiError::not_found("contract"));
            }
            Err(err) => {
                return Err(ApiError::from_domain(
                    &err.into(),
                    self.limits.developer_mode,
                ));
            }
        };

        let revert = match &result.outcome {
            EvaluationOutcome::Ok => None,
            EvaluationOutcome::Revert(reason) => Some(encoding::to_base64(reason)),
            EvaluationOutcome::OutOfGas => Some(encoding::to_base64(b"out of gas")),
            EvaluationOutcome::DepthExceeded => {
                Some(encoding::to_base64(b"call depth exceeded"))
            }
            EvaluationOutcome::Reentrancy(addr) => Some(encoding::to_base64(
                format!("reentrancy: {addr}").as_bytes(),
            )),
        };

        Ok(ApiCallResult {
            result: encoding::to_base64(&result.result),
            events: result
                .events
                .iter()
                .map(|event| crate::blocks::ApiEvent {
                    contract: event.contract.to_string(),
                    topic: event.topic.clone(),
                    data: encoding::to_base64(&event.data),
                })
                .collect(),
            gas_used: encoding::u64_to_hex(result.gas_used),
            changed_storage: encode_slots(&result.storage_writes),
            loaded_storage: encode_slots(&result.loaded_storage),
            revert,
            deployed_contracts: result
                .deployed_contracts
                .iter()
                .map(|c| c.address.to_string())
                .collect(),
        })
    }
}

fn encode_slots(
    slots: &BTreeMap<ContractAddress, SlotMap>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    slots
        .iter()
        .map(|(contract, map)| {
            (
                contract.to_string(),
                map.iter()
                    .map(|(pointer, value)| {
                        (encoding::to_base64(pointer), encoding::to_base64(value))
                    })
                    .collect(),
            )
        })
        .collect()
}

fn decode_preloaded(
    raw: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<BTreeMap<ContractAddress, SlotMap>, ApiError> {
    let mut decoded = BTreeMap::new();
    for (contract, slots) in raw {
        let mut slot_map = SlotMap::new();
        for (pointer_b64, value_b64) in slots {
            let pointer = encoding::from_base64(pointer_b64)
                .map_err(|_| ApiError::invalid_input("preload pointer must be base64"))?;
            let value = encoding::from_base64(value_b64)
                .map_err(|_| ApiError::invalid_input("preload value must be base64"))?;
            let pointer: [u8; 32] = pointer
                .try_into()
                .map_err(|_| ApiError::invalid_input("preload pointer must be 32 bytes"))?;
            let value: [u8; 32] = value
                .try_into()
                .map_err(|_| ApiError::invalid_input("preload value must be 32 bytes"))?;
            slot_map.insert(pointer, value);
        }
        decoded.insert(ContractAddress::new(contract.clone()), slot_map);
    }
    Ok(decoded)
}
