//! # Gas Metering
//!
//! Fixed host-function costs plus byte-linear storage-write pricing. The
//! priority fee is not charged here; the block processor accounts it.

use crate::errors::EvaluationError;
use shared_types::Gas;

/// Fixed costs of host operations.
pub mod costs {
    use shared_types::Gas;

    /// Charged once per top-level evaluation.
    pub const EXECUTION_BASE: Gas = 21_000;
    /// Storage slot read.
    pub const STORAGE_LOAD: Gas = 2_100;
    /// Storage write, before the byte-linear component.
    pub const STORAGE_STORE_BASE: Gas = 5_000;
    /// Event emission base.
    pub const EVENT_BASE: Gas = 375;
    /// Event emission, per byte of data.
    pub const EVENT_DATA_PER_BYTE: Gas = 8;
    /// External contract call.
    pub const CALL_BASE: Gas = 2_600;
    /// Nested contract deployment.
    pub const DEPLOY_BASE: Gas = 32_000;
}

/// Tracks gas consumption against a hard limit.
///
/// On exhaustion `used` saturates at `max`, so `gas_used == gas_limit`
/// holds for out-of-gas transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasTracker {
    max_gas: Gas,
    used_gas: Gas,
}

impl GasTracker {
    #[must_use]
    pub fn new(max_gas: Gas) -> Self {
        Self {
            max_gas,
            used_gas: 0,
        }
    }

    /// Charge `amount`, failing with `OutOfGas` once the limit is crossed.
    pub fn charge(&mut self, amount: Gas) -> Result<(), EvaluationError> {
        let next = self.used_gas.saturating_add(amount);
        if next > self.max_gas {
            self.used_gas = self.max_gas;
            return Err(EvaluationError::OutOfGas);
        }
        self.used_gas = next;
        Ok(())
    }

    /// Charge a storage write: base plus per-byte cost.
    pub fn charge_storage_write(
        &mut self,
        value_len: usize,
        per_byte: Gas,
    ) -> Result<(), EvaluationError> {
        let linear = per_byte.saturating_mul(value_len as Gas);
        self.charge(costs::STORAGE_STORE_BASE.saturating_add(linear))
    }

    #[must_use]
    pub fn used(&self) -> Gas {
        self.used_gas
    }

    #[must_use]
    pub fn limit(&self) -> Gas {
        self.max_gas
    }

    #[must_use]
    pub fn remaining(&self) -> Gas {
        self.max_gas - self.used_gas
    }

    /// Adopt the consumption of a speculative clone.
    pub fn adopt(&mut self, other: &GasTracker) {
        debug_assert_eq!(self.max_gas, other.max_gas);
        self.used_gas = other.used_gas;
    }

    /// Release a reservation made for a discarded attempt. The attempt's
    /// work is re-charged exactly once when its frame completes.
    pub fn refund(&mut self, amount: Gas) {
        self.used_gas = self.used_gas.saturating_sub(amount);
    }
}
