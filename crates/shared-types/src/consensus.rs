//! # Consensus Rulesets
//!
//! Consensus upgrades are modeled as an immutable array of rulesets keyed
//! by activation height. The registry is built once at startup and passed
//! explicitly to the components that need it; there are no globals.
//!
//! Traversing past the last known ruleset (a scheduled upgrade whose rules
//! this build does not carry) surfaces a structured fatal instead of an
//! abort.

use crate::entities::{Gas, Satoshis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by ruleset resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// No ruleset activates at or below the requested height.
    #[error("no ruleset active at height {0}")]
    NoActiveRuleset(u64),

    /// The chain reached a scheduled upgrade this build does not know.
    #[error("unknown consensus upgrade at height {enacts_at}; current ruleset {current}")]
    UnknownUpgrade { enacts_at: u64, current: String },
}

/// One immutable set of consensus parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusRuleset {
    /// Upgrade name (e.g. "roswell").
    pub name: String,
    /// First height this ruleset applies to.
    pub activation_height: u64,
    /// Multiplier applied to gas fees when ranking transaction groups.
    pub gas_penalty_factor: u64,
    /// Maximum nested contract call depth.
    pub max_call_depth: u32,
    /// Maximum nested deployment depth.
    pub max_deploy_depth: u32,
    /// Whether re-entering a contract on the active call stack is rejected.
    pub reentrancy_guard: bool,
    /// Hard per-transaction gas ceiling.
    pub max_gas_per_tx: Gas,
    /// Outputs below this value are not tracked as unspent.
    pub dust_threshold: Satoshis,
    /// Blocks per epoch window.
    pub epoch_length: u64,
    /// Gas charged per byte written to a storage slot.
    pub storage_write_cost_per_byte: Gas,
}

impl ConsensusRuleset {
    /// The genesis ruleset used when no overrides are configured.
    #[must_use]
    pub fn genesis() -> Self {
        Self {
            name: "genesis".to_string(),
            activation_height: 0,
            gas_penalty_factor: 1_000,
            max_call_depth: 16,
            max_deploy_depth: 4,
            reentrancy_guard: true,
            max_gas_per_tx: 100_000_000_000,
            dust_threshold: 330,
            epoch_length: 5,
            storage_write_cost_per_byte: 1_000,
        }
    }
}

/// Immutable array of rulesets with height-keyed lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRegistry {
    /// Rulesets sorted by ascending activation height.
    rulesets: Vec<ConsensusRuleset>,
    /// Height of a scheduled upgrade whose rules are not in this build.
    unknown_upgrade_at: Option<u64>,
}

impl ConsensusRegistry {
    /// Build a registry. Rulesets are sorted by activation height.
    #[must_use]
    pub fn new(mut rulesets: Vec<ConsensusRuleset>, unknown_upgrade_at: Option<u64>) -> Self {
        rulesets.sort_by_key(|r| r.activation_height);
        Self {
            rulesets,
            unknown_upgrade_at,
        }
    }

    /// Registry with only the genesis ruleset.
    #[must_use]
    pub fn genesis() -> Self {
        Self::new(vec![ConsensusRuleset::genesis()], None)
    }

    /// The ruleset active at `height`.
    ///
    /// Returns [`ConsensusError::UnknownUpgrade`] once `height` crosses a
    /// scheduled upgrade this build does not carry.
    pub fn active_at(&self, height: u64) -> Result<&ConsensusRuleset, ConsensusError> {
        let current = self
            .rulesets
            .iter()
            .rev()
            .find(|r| r.activation_height <= height)
            .ok_or(ConsensusError::NoActiveRuleset(height))?;

        if let Some(enacts_at) = self.unknown_upgrade_at {
            if height >= enacts_at {
                return Err(ConsensusError::UnknownUpgrade {
                    enacts_at,
                    current: current.name.clone(),
                });
            }
        }
        Ok(current)
    }
}
