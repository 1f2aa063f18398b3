//! # Base-Chain RPC Client
//!
//! The collaborator interface to the base-chain node, plus a JSON-RPC
//! implementation over HTTP basic auth and an in-memory fake for tests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{encoding, Hash, Network, RawBlock, Transaction, TransactionInput, TransactionOutput, TransactionType};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// RPC connection configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub network: Network,
}

impl RpcConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// RPC failures.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("rpc transport failure: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),

    #[error("block not found: {0}")]
    NotFound(String),
}

/// The base-chain RPC surface the core consumes.
#[async_trait]
pub trait BitcoinRpc: Send + Sync {
    async fn get_best_block_hash(&self) -> Result<Hash, RpcError>;
    async fn get_block_count(&self) -> Result<u64, RpcError>;
    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError>;
    /// `getblock` at verbosity 2, decoded into a [`RawBlock`].
    async fn get_block(&self, hash: &Hash) -> Result<RawBlock, RpcError>;
    async fn get_block_header(&self, hash: &Hash) -> Result<Value, RpcError>;
    async fn get_chain_tips(&self) -> Result<Value, RpcError>;
    async fn get_raw_mempool(&self) -> Result<Vec<Hash>, RpcError>;
    async fn get_raw_transaction(&self, tx_id: &Hash) -> Result<Value, RpcError>;
    async fn get_tx_out(&self, tx_id: &Hash, index: u32) -> Result<Value, RpcError>;
    async fn verify_chain(&self) -> Result<bool, RpcError>;
}

// =============================================================================
// JSON-RPC CLIENT
// =============================================================================

/// JSON-RPC over HTTP client for a Bitcoin-family node.
pub struct JsonRpcClient {
    config: RpcConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcClient {
    #[must_use]
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "opx",
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(self.config.url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;

        let decoded: JsonRpcResponse = response
            .json()
            .await
            .map_err(|err| RpcError::Malformed(err.to_string()))?;

        if let Some(error) = decoded.error {
            return Err(RpcError::Server {
                code: error.code,
                message: error.message,
            });
        }
        decoded
            .result
            .ok_or_else(|| RpcError::Malformed("missing result".into()))
    }

    fn parse_hash(value: &Value) -> Result<Hash, RpcError> {
        let text = value
            .as_str()
            .ok_or_else(|| RpcError::Malformed("expected hash string".into()))?;
        encoding::parse_hash_param(text)
            .ok_or_else(|| RpcError::Malformed(format!("bad hash: {text}")))
    }

    fn parse_block(value: &Value) -> Result<RawBlock, RpcError> {
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::Malformed("expected block object".into()))?;
        let height = object
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::Malformed("missing height".into()))?;
        let hash = Self::parse_hash(
            object
                .get("hash")
                .ok_or_else(|| RpcError::Malformed("missing hash".into()))?,
        )?;
        let previous_block_hash = object
            .get("previousblockhash")
            .map(Self::parse_hash)
            .transpose()?
            .unwrap_or([0u8; 32]);
        let time = object.get("time").and_then(Value::as_u64).unwrap_or(0);
        let median_time = object
            .get("mediantime")
            .and_then(Value::as_u64)
            .unwrap_or(time);

        let mut transactions = Vec::new();
        if let Some(txs) = object.get("tx").and_then(Value::as_array) {
            for (index, tx) in txs.iter().enumerate() {
                transactions.push(Self::parse_transaction(tx, height, index as u32)?);
            }
        }

        Ok(RawBlock {
            height,
            hash,
            previous_block_hash,
            time,
            median_time,
            transactions,
        })
    }

    fn parse_transaction(value: &Value, height: u64, index: u32) -> Result<Transaction, RpcError> {
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::Malformed("expected tx object".into()))?;
        let id = Self::parse_hash(
            object
                .get("txid")
                .ok_or_else(|| RpcError::Malformed("missing txid".into()))?,
        )?;
        let hash = object
            .get("hash")
            .map(Self::parse_hash)
            .transpose()?
            .unwrap_or(id);

        let mut inputs = Vec::new();
        let mut is_coinbase = false;
        if let Some(vin) = object.get("vin").and_then(Value::as_array) {
            for input in vin {
                if input.get("coinbase").is_some() {
                    is_coinbase = true;
                    continue;
                }
                let original_tx_id = input
                    .get("txid")
                    .map(Self::parse_hash)
                    .transpose()?
                    .unwrap_or([0u8; 32]);
                let output_index =
                    input.get("vout").and_then(Value::as_u64).unwrap_or(0) as u32;
                let script_sig = input
                    .get("scriptSig")
                    .and_then(|s| s.get("hex"))
                    .and_then(Value::as_str)
                    .and_then(|h| hex::decode(h).ok())
                    .unwrap_or_default();
                let witness = input
                    .get("txinwitness")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .filter_map(|h| hex::decode(h).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                inputs.push(TransactionInput {
                    original_tx_id,
                    output_index,
                    script_sig,
                    witness,
                });
            }
        }

        let mut outputs = Vec::new();
        if let Some(vout) = object.get("vout").and_then(Value::as_array) {
            for output in vout {
                let value_btc = output.get("value").and_then(Value::as_f64).unwrap_or(0.0);
                let script_pub_key = output
                    .get("scriptPubKey")
                    .and_then(|s| s.get("hex"))
                    .and_then(Value::as_str)
                    .and_then(|h| hex::decode(h).ok())
                    .unwrap_or_default();
                outputs.push(TransactionOutput {
                    // Round through satoshis; node values are BTC floats.
                    value: (value_btc * 100_000_000.0).round() as u64,
                    script_pub_key,
                    address: None,
                });
            }
        }

        Ok(Transaction {
            id,
            hash,
            kind: if is_coinbase {
                TransactionType::Coinbase
            } else {
                TransactionType::Generic
            },
            inputs,
            outputs,
            block_height: height,
            index_in_block: index,
            interaction: None,
            deployment: None,
            receipt: None,
        })
    }
}

#[async_trait]
impl BitcoinRpc for JsonRpcClient {
    async fn get_best_block_hash(&self) -> Result<Hash, RpcError> {
        let result = self.call("getbestblockhash", json!([])).await?;
        Self::parse_hash(&result)
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| RpcError::Malformed("expected integer".into()))
    }

    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError> {
        let result = self.call("getblockhash", json!([height])).await?;
        Self::parse_hash(&result)
    }

    async fn get_block(&self, hash: &Hash) -> Result<RawBlock, RpcError> {
        let hash_hex = hex::encode(hash);
        debug!(block = %hash_hex, "fetching block");
        let result = self.call("getblock", json!([hash_hex, 2])).await?;
        Self::parse_block(&result)
    }

    async fn get_block_header(&self, hash: &Hash) -> Result<Value, RpcError> {
        self.call("getblockheader", json!([hex::encode(hash), true]))
            .await
    }

    async fn get_chain_tips(&self) -> Result<Value, RpcError> {
        self.call("getchaintips", json!([])).await
    }

    async fn get_raw_mempool(&self) -> Result<Vec<Hash>, RpcError> {
        let result = self.call("getrawmempool", json!([])).await?;
        let entries = result
            .as_array()
            .ok_or_else(|| RpcError::Malformed("expected array".into()))?;
        entries.iter().map(Self::parse_hash).collect()
    }

    async fn get_raw_transaction(&self, tx_id: &Hash) -> Result<Value, RpcError> {
        self.call("getrawtransaction", json!([hex::encode(tx_id), true]))
            .await
    }

    async fn get_tx_out(&self, tx_id: &Hash, index: u32) -> Result<Value, RpcError> {
        self.call("gettxout", json!([hex::encode(tx_id), index]))
            .await
    }

    async fn verify_chain(&self) -> Result<bool, RpcError> {
        let result = self.call("verifychain", json!([])).await?;
        result
            .as_bool()
            .ok_or_else(|| RpcError::Malformed("expected boolean".into()))
    }
}

// =============================================================================
// TEST FAKE
// =============================================================================

/// An in-memory chain the scheduler and observer tests drive directly.
#[derive(Default)]
pub struct FakeChain {
    blocks: RwLock<BTreeMap<u64, RawBlock>>,
}

impl FakeChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or replace a block at its height.
    pub fn put_block(&self, block: RawBlock) {
        self.blocks.write().unwrap().insert(block.height, block);
    }

    /// Replace the chain from `from_height` upward with new blocks.
    pub fn fork_from(&self, from_height: u64, replacement: Vec<RawBlock>) {
        let mut blocks = self.blocks.write().unwrap();
        blocks.retain(|&height, _| height < from_height);
        for block in replacement {
            blocks.insert(block.height, block);
        }
    }
}

#[async_trait]
impl BitcoinRpc for FakeChain {
    async fn get_best_block_hash(&self) -> Result<Hash, RpcError> {
        let blocks = self.blocks.read().unwrap();
        blocks
            .values()
            .next_back()
            .map(|b| b.hash)
            .ok_or_else(|| RpcError::NotFound("empty chain".into()))
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        let blocks = self.blocks.read().unwrap();
        Ok(blocks.keys().next_back().copied().unwrap_or(0))
    }

    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError> {
        let blocks = self.blocks.read().unwrap();
        blocks
            .get(&height)
            .map(|b| b.hash)
            .ok_or_else(|| RpcError::NotFound(format!("height {height}")))
    }

    async fn get_block(&self, hash: &Hash) -> Result<RawBlock, RpcError> {
        let blocks = self.blocks.read().unwrap();
        blocks
            .values()
            .find(|b| &b.hash == hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(hex::encode(hash)))
    }

    async fn get_block_header(&self, _hash: &Hash) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn get_chain_tips(&self) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn get_raw_mempool(&self) -> Result<Vec<Hash>, RpcError> {
        Ok(Vec::new())
    }

    async fn get_raw_transaction(&self, _tx_id: &Hash) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn get_tx_out(&self, _tx_id: &Hash, _index: u32) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn verify_chain(&self) -> Result<bool, RpcError> {
        Ok(true)
    }
}
