//! # Node Configuration
//!
//! One typed aggregate with production-sane defaults and `OPX_*`
//! environment overrides. Validation happens once at startup.

use opx_indexer::{RpcConfig, SchedulerConfig};
use opx_utxo::UtxoConfig;
use shared_types::Network;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors surfaced at startup.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Base-chain network.
    pub network: Network,
    /// Base-chain RPC connection.
    pub rpc: RpcSettings,
    /// Storage paths and retention.
    pub storage: StorageSettings,
    /// Indexer scheduling.
    pub indexer: IndexerSettings,
    /// UTXO ledger policy.
    pub utxo: UtxoConfig,
    /// Plugin hook dispatch.
    pub hooks: HookSettings,
    /// API limits.
    pub api: opx_api::ApiLimits,
}

/// Base-chain RPC settings.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Storage settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Data directory holding the database and lock file.
    pub data_dir: PathBuf,
}

/// Indexer settings.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// Maximum prefetch tasks in flight.
    pub pending_block_threshold: usize,
    /// Observation poll interval.
    pub poll_interval: Duration,
    /// Headers re-checked per observation (reorg horizon).
    pub reorg_depth: u64,
    /// First height to index on an empty store.
    pub start_height: u64,
    /// Evaluator pool size for read-only calls.
    pub view_pool_size: usize,
}

/// Hook settings.
#[derive(Debug, Clone)]
pub struct HookSettings {
    /// Droppable dispatches above this mark are rejected.
    pub high_water_mark: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let network = Network::default();
        Self {
            network,
            rpc: RpcSettings {
                host: "127.0.0.1".to_string(),
                port: network.default_rpc_port(),
                username: "opx".to_string(),
                password: String::new(),
            },
            storage: StorageSettings {
                data_dir: PathBuf::from("./data"),
            },
            indexer: IndexerSettings {
                pending_block_threshold: 10,
                poll_interval: Duration::from_secs(2),
                reorg_depth: 100,
                start_height: 1,
                view_pool_size: 4,
            },
            utxo: UtxoConfig::default(),
            hooks: HookSettings {
                high_water_mark: 256,
            },
            api: opx_api::ApiLimits::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults with `OPX_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(network) = std::env::var("OPX_NETWORK") {
            config.network = match network.to_ascii_lowercase().as_str() {
                "mainnet" => Network::Mainnet,
                "testnet" => Network::Testnet,
                "testnet4" => Network::Testnet4,
                "regtest" => Network::Regtest,
                "signet" => Network::Signet,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "OPX_NETWORK",
                        detail: format!("unknown network {other}"),
                    });
                }
            };
            config.rpc.port = config.network.default_rpc_port();
        }
        if let Ok(host) = std::env::var("OPX_RPC_HOST") {
            config.rpc.host = host;
        }
        if let Ok(port) = std::env::var("OPX_RPC_PORT") {
            config.rpc.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "OPX_RPC_PORT",
                detail: port.clone(),
            })?;
        }
        if let Ok(username) = std::env::var("OPX_RPC_USER") {
            config.rpc.username = username;
        }
        if let Ok(password) = std::env::var("OPX_RPC_PASSWORD") {
            config.rpc.password = password;
        }
        if let Ok(dir) = std::env::var("OPX_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(threshold) = std::env::var("OPX_PENDING_BLOCKS") {
            config.indexer.pending_block_threshold =
                threshold.parse().map_err(|_| ConfigError::Invalid {
                    key: "OPX_PENDING_BLOCKS",
                    detail: threshold.clone(),
                })?;
        }
        if let Ok(depth) = std::env::var("OPX_REORG_DEPTH") {
            config.indexer.reorg_depth = depth.parse().map_err(|_| ConfigError::Invalid {
                key: "OPX_REORG_DEPTH",
                detail: depth.clone(),
            })?;
        }
        if let Ok(purge) = std::env::var("OPX_PURGE_SPENT") {
            config.utxo.purge_enabled = purge == "1" || purge.eq_ignore_ascii_case("true");
        }

        config.validate()?;
        Ok(config)
    }

    /// Startup validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexer.pending_block_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "OPX_PENDING_BLOCKS",
                detail: "must be at least 1".into(),
            });
        }
        if self.indexer.reorg_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "OPX_REORG_DEPTH",
                detail: "must be at least 1".into(),
            });
        }
        if self.indexer.view_pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "view_pool_size",
                detail: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// RPC client configuration.
    #[must_use]
    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            host: self.rpc.host.clone(),
            port: self.rpc.port,
            username: self.rpc.username.clone(),
            password: self.rpc.password.clone(),
            network: self.network,
        }
    }

    /// Scheduler configuration.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            pending_block_threshold: self.indexer.pending_block_threshold,
            poll_interval: self.indexer.poll_interval,
            start_height: self.indexer.start_height,
        }
    }
}
