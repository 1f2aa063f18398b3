//! # Scripted Runtime
//!
//! A deterministic in-process [`ContractRuntime`] used by tests across
//! the workspace. A contract is a list of steps executed against the same
//! attempt protocol the WASM adapter uses, so the evaluator's discovery
//! loop, call resolution, and gas accounting are exercised for real.

use crate::deploy::derive_contract_address;
use crate::errors::EvaluationError;
use crate::evaluator::{ContractEvaluator, ContractSource, SlotSource, VmLimits};
use crate::gas::costs;
use crate::params::SlotMap;
use crate::runtime::{
    CallRequest, ContractRuntime, DeployRequest, ExecStatus, ExecutionEffects, ExecutionInput,
    RuntimeInstance,
};
use shared_types::{
    ConsensusRuleset, ContractAddress, ContractEvent, ContractInformation, Gas, Hash, SlotValue,
    StoragePointer,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// One step of a scripted contract.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Read a slot (discovering it if not in the working set).
    ReadSlot(StoragePointer),
    /// Write a fixed value.
    WriteSlot(StoragePointer, SlotValue),
    /// Read one slot and write its value to another: a data-dependent
    /// footprint that exercises the discovery loop.
    WriteSlotFromRead {
        read: StoragePointer,
        write: StoragePointer,
    },
    /// Emit an event.
    Emit { topic: String, data: Vec<u8> },
    /// Call another contract.
    CallContract {
        target: ContractAddress,
        calldata: Vec<u8>,
    },
    /// Deploy a child contract.
    Deploy {
        bytecode: Vec<u8>,
        salt_hash: Hash,
        seed: Hash,
    },
    /// Revert with a reason.
    Revert(Vec<u8>),
    /// Consume a fixed amount of gas.
    BurnGas(Gas),
}

/// A scripted contract.
#[derive(Debug, Clone, Default)]
pub struct ScriptedContract {
    /// Slots declared up front.
    pub required: Vec<StoragePointer>,
    /// Steps run in order.
    pub steps: Vec<ScriptStep>,
    /// Entrypoint return value.
    pub result: Vec<u8>,
}

impl ScriptedContract {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requires(mut self, pointer: StoragePointer) -> Self {
        self.required.push(pointer);
        self
    }

    #[must_use]
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn returns(mut self, result: Vec<u8>) -> Self {
        self.result = result;
        self
    }
}

struct ScriptedInstance {
    address: ContractAddress,
    script: ScriptedContract,
}

impl RuntimeInstance for ScriptedInstance {
    fn required_slots(&mut self, _calldata: &[u8]) -> Result<Vec<StoragePointer>, EvaluationError> {
        Ok(self.script.required.clone())
    }

    fn execute(&mut self, input: &ExecutionInput<'_>) -> Result<ExecutionEffects, EvaluationError> {
        let mut effects = ExecutionEffects {
            status: ExecStatus::Done(self.script.result.clone()),
            writes: SlotMap::new(),
            events: Vec::new(),
            loaded: SlotMap::new(),
            discovered: BTreeSet::new(),
            gas_used: 0,
        };
        let mut call_index = 0usize;
        let mut deploy_index = 0usize;

        macro_rules! charge {
            ($amount:expr) => {
                let next = effects.gas_used.saturating_add($amount);
                if next > input.gas_budget {
                    effects.gas_used = input.gas_budget;
                    effects.status = ExecStatus::OutOfGas;
                    return Ok(effects);
                }
                effects.gas_used = next;
            };
        }

        let mut read = |pointer: &StoragePointer,
                        effects: &mut ExecutionEffects|
         -> SlotValue {
            if let Some(value) = effects.writes.get(pointer) {
                return *value;
            }
            match input.working_set.get(pointer) {
                Some(value) => {
                    effects.loaded.insert(*pointer, *value);
                    *value
                }
                None => {
                    effects.discovered.insert(*pointer);
                    [0u8; 32]
                }
            }
        };

        for step in self.script.steps.clone() {
            match step {
                ScriptStep::ReadSlot(pointer) => {
                    charge!(costs::STORAGE_LOAD);
                    read(&pointer, &mut effects);
                }
                ScriptStep::WriteSlot(pointer, value) => {
                    charge!(
                        costs::STORAGE_STORE_BASE
                            + input.write_cost_per_byte.saturating_mul(value.len() as Gas)
                    );
                    effects.writes.insert(pointer, value);
                }
                ScriptStep::WriteSlotFromRead { read: from, write } => {
                    charge!(costs::STORAGE_LOAD);
                    let value = read(&from, &mut effects);
                    charge!(
                        costs::STORAGE_STORE_BASE
                            + input.write_cost_per_byte.saturating_mul(value.len() as Gas)
                    );
                    effects.writes.insert(write, value);
                }
                ScriptStep::Emit { topic, data } => {
                    charge!(
                        costs::EVENT_BASE
                            + costs::EVENT_DATA_PER_BYTE.saturating_mul(data.len() as Gas)
                    );
                    effects.events.push(ContractEvent {
                        contract: self.address.clone(),
                        topic,
                        data,
                    });
                }
                ScriptStep::CallContract { target, calldata } => {
                    charge!(costs::CALL_BASE);
                    match input.call_responses.get(call_index) {
                        Some(response) => {
                            call_index += 1;
                            if response.success {
                                effects.events.extend(response.events.clone());
                            }
                        }
                        None => {
                            effects.status = ExecStatus::NeedsCall(CallRequest {
                                target,
                                calldata,
                            });
                            return Ok(effects);
                        }
                    }
                }
                ScriptStep::Deploy {
                    bytecode,
                    salt_hash,
                    seed,
                } => {
                    charge!(costs::DEPLOY_BASE);
                    match input.deploy_responses.get(deploy_index) {
                        Some(_) => deploy_index += 1,
                        None => {
                            effects.status = ExecStatus::NeedsDeploy(DeployRequest {
                                bytecode,
                                salt_hash,
                                seed,
                            });
                            return Ok(effects);
                        }
                    }
                }
                ScriptStep::Revert(reason) => {
                    effects.status = ExecStatus::Reverted(reason);
                    return Ok(effects);
                }
                ScriptStep::BurnGas(amount) => {
                    charge!(amount);
                }
            }
        }
        Ok(effects)
    }
}

/// Scripted runtime resolving contracts by address.
pub struct ScriptedRuntime {
    scripts: Arc<RwLock<HashMap<ContractAddress, ScriptedContract>>>,
}

impl ContractRuntime for ScriptedRuntime {
    fn instantiate(
        &self,
        contract: &ContractAddress,
        _bytecode: &[u8],
    ) -> Result<Box<dyn RuntimeInstance>, EvaluationError> {
        let scripts = self
            .scripts
            .read()
            .map_err(|_| EvaluationError::HostPanic("script registry poisoned".into()))?;
        let script = scripts
            .get(contract)
            .cloned()
            .ok_or_else(|| EvaluationError::HostPanic(format!("no script for {contract}")))?;
        Ok(Box::new(ScriptedInstance {
            address: contract.clone(),
            script,
        }))
    }
}

/// A self-contained world: contract registry, slot store, and runtime.
#[derive(Clone, Default)]
pub struct InMemoryWorld {
    contracts: Arc<RwLock<HashMap<ContractAddress, ContractInformation>>>,
    scripts: Arc<RwLock<HashMap<ContractAddress, ScriptedContract>>>,
    slots: Arc<RwLock<HashMap<(ContractAddress, StoragePointer), SlotValue>>>,
}

impl InMemoryWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The address a named scripted contract will deploy at.
    #[must_use]
    pub fn address_of(&self, name: &str) -> ContractAddress {
        derive_contract_address(name.as_bytes(), &[0u8; 32], &[0u8; 32])
    }

    /// Register a scripted contract under a deterministic address.
    pub fn register(&self, name: &str, script: ScriptedContract) -> ContractAddress {
        let address = self.address_of(name);
        let info = ContractInformation {
            address: address.clone(),
            tweaked_public_key: format!("tweak-{name}").into_bytes(),
            deployed_at_height: 0,
            bytecode: name.as_bytes().to_vec(),
            deployer_public_key: name.as_bytes().to_vec(),
            salt_hash: [0u8; 32],
            seed: [0u8; 32],
        };
        self.contracts.write().unwrap().insert(address.clone(), info);
        self.scripts.write().unwrap().insert(address.clone(), script);
        address
    }

    /// Install a contract record without a script (e.g. a queued
    /// deployment).
    pub fn install(&self, info: ContractInformation) {
        self.contracts.write().unwrap().insert(info.address.clone(), info);
    }

    /// Attach a script to an arbitrary address, e.g. one derived by a
    /// deployment that will execute later.
    pub fn register_script_at(&self, address: ContractAddress, script: ScriptedContract) {
        self.scripts.write().unwrap().insert(address, script);
    }

    /// Seed a persisted slot value for a named contract.
    pub fn seed_slot(&self, name: &str, pointer: StoragePointer, value: SlotValue) {
        let address = self.address_of(name);
        self.slots.write().unwrap().insert((address, pointer), value);
    }

    /// The scripted runtime backing this world.
    #[must_use]
    pub fn runtime(&self) -> Arc<dyn ContractRuntime> {
        Arc::new(ScriptedRuntime {
            scripts: self.scripts.clone(),
        })
    }

    /// Build an evaluator over this world with genesis limits.
    #[must_use]
    pub fn evaluator(&self) -> ContractEvaluator {
        let limits = VmLimits::from(&ConsensusRuleset::genesis());
        ContractEvaluator::new(
            Arc::new(ScriptedRuntime {
                scripts: self.scripts.clone(),
            }),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            limits,
        )
    }
}

impl ContractSource for InMemoryWorld {
    fn get_contract(
        &self,
        address: &ContractAddress,
        at_height: u64,
    ) -> Result<Option<ContractInformation>, EvaluationError> {
        let contracts = self
            .contracts
            .read()
            .map_err(|_| EvaluationError::Storage("contract registry poisoned".into()))?;
        Ok(contracts
            .get(address)
            .filter(|info| info.deployed_at_height <= at_height)
            .cloned())
    }
}

impl SlotSource for InMemoryWorld {
    fn load_slot(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Result<Option<SlotValue>, EvaluationError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| EvaluationError::Storage("slot store poisoned".into()))?;
        Ok(slots.get(&(contract.clone(), *pointer)).copied())
    }
}
