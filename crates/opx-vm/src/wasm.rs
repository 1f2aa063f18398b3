//! # WASM Runtime Adapter
//!
//! Sandboxed contract execution on the `wasmi` interpreter with fuel
//! metering mapped 1:1 to gas.
//!
//! ## ABI
//!
//! A contract module exports:
//!
//! - `memory`: linear memory
//! - `allocate(len: i32) -> i32`: reserve a guest buffer
//! - `execute(ptr: i32, len: i32) -> i64`: entrypoint; calldata is copied
//!   to `ptr`; the return packs the result buffer as `(ptr << 32) | len`
//! - `required_slots() -> i64` (optional): packed buffer of concatenated
//!   32-byte pointers declaring the up-front working set
//!
//! And imports, under module `env` (all synchronous; no external
//! suspension inside WASM execution):
//!
//! - `storage_load(ptr: i32, out: i32) -> i32`: 0 = served, 1 = slot not
//!   in the working set (the attempt will be re-executed with it loaded)
//! - `storage_store(ptr: i32, value: i32) -> i32`
//! - `emit(topic_ptr, topic_len, data_ptr, data_len) -> i32`
//! - `call(addr_ptr, addr_len, calldata_ptr, calldata_len) -> i32`:
//!   0 = resolved success, 1 = resolved failure, 2 = pending resolution
//! - `call_result_len() -> i32`, `call_result_copy(out: i32) -> i32`
//! - `deploy(bytecode_ptr, bytecode_len, salt_ptr, seed_ptr, addr_out) -> i32`
//! - `revert(ptr: i32, len: i32) -> i32`
//!
//! Host functions signal "stop the attempt" by recording an interrupt and
//! returning a nonzero status; a conforming contract returns promptly.
//! The adapter inspects the interrupt after the call regardless of what
//! the guest returned, so a misbehaving contract only wastes its own gas.

use crate::errors::EvaluationError;
use crate::gas::costs;
use crate::params::SlotMap;
use crate::runtime::{
    CallRequest, ContractRuntime, DeployRequest, ExecStatus, ExecutionEffects, ExecutionInput,
    RuntimeInstance,
};
use shared_types::{ContractAddress, ContractEvent, Gas, SlotValue, StoragePointer};
use std::collections::BTreeSet;
use tracing::warn;
use wasmi::{Caller, Config, Engine, Linker, Module, Store, TypedFunc};

/// Effects and interrupt state owned by the store during one attempt.
struct HostState {
    contract: ContractAddress,
    working_set: SlotMap,
    call_responses: Vec<crate::runtime::CallResult>,
    deploy_responses: Vec<ContractAddress>,
    next_call: usize,
    next_deploy: usize,
    last_call_result: Vec<u8>,
    write_cost_per_byte: Gas,
    writes: SlotMap,
    events: Vec<ContractEvent>,
    loaded: SlotMap,
    discovered: BTreeSet<StoragePointer>,
    interrupt: Option<Interrupt>,
}

enum Interrupt {
    Call(CallRequest),
    Deploy(DeployRequest),
    Revert(Vec<u8>),
}

/// `wasmi`-backed contract runtime.
pub struct WasmRuntime {
    engine: Engine,
}

impl WasmRuntime {
    #[must_use]
    pub fn new() -> Self {
        let mut config = Config::default();
        config.consume_fuel(true);
        Self {
            engine: Engine::new(&config),
        }
    }
}

impl Default for WasmRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractRuntime for WasmRuntime {
    fn instantiate(
        &self,
        contract: &ContractAddress,
        bytecode: &[u8],
    ) -> Result<Box<dyn RuntimeInstance>, EvaluationError> {
        let module = Module::new(&self.engine, bytecode)
            .map_err(|err| EvaluationError::HostPanic(format!("invalid module: {err}")))?;
        Ok(Box::new(WasmInstance {
            engine: self.engine.clone(),
            module,
            contract: contract.clone(),
        }))
    }
}

struct WasmInstance {
    engine: Engine,
    module: Module,
    contract: ContractAddress,
}

fn read_memory(
    caller: &mut Caller<'_, HostState>,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, wasmi::Error> {
    let memory = caller
        .get_export("memory")
        .and_then(wasmi::Extern::into_memory)
        .ok_or_else(|| wasmi::Error::new("missing memory export"))?;
    let mut buffer = vec![0u8; len as usize];
    memory
        .read(&caller, ptr as usize, &mut buffer)
        .map_err(|err| wasmi::Error::new(format!("guest read failed: {err}")))?;
    Ok(buffer)
}

fn write_memory(
    caller: &mut Caller<'_, HostState>,
    ptr: u32,
    bytes: &[u8],
) -> Result<(), wasmi::Error> {
    let memory = caller
        .get_export("memory")
        .and_then(wasmi::Extern::into_memory)
        .ok_or_else(|| wasmi::Error::new("missing memory export"))?;
    memory
        .write(&mut *caller, ptr as usize, bytes)
        .map_err(|err| wasmi::Error::new(format!("guest write failed: {err}")))
}

fn charge_fuel(caller: &mut Caller<'_, HostState>, amount: Gas) -> Result<bool, wasmi::Error> {
    let fuel = caller
        .get_fuel()
        .map_err(|err| wasmi::Error::new(format!("fuel unavailable: {err}")))?;
    if fuel < amount {
        caller
            .set_fuel(0)
            .map_err(|err| wasmi::Error::new(format!("fuel update failed: {err}")))?;
        return Ok(false);
    }
    caller
        .set_fuel(fuel - amount)
        .map_err(|err| wasmi::Error::new(format!("fuel update failed: {err}")))?;
    Ok(true)
}

fn pointer_from(bytes: &[u8]) -> StoragePointer {
    let mut pointer = [0u8; 32];
    pointer.copy_from_slice(&bytes[..32]);
    pointer
}

impl WasmInstance {
    fn link(&self, linker: &mut Linker<HostState>) -> Result<(), wasmi::Error> {
        linker.func_wrap(
            "env",
            "storage_load",
            |mut caller: Caller<'_, HostState>, ptr: u32, out: u32| -> Result<i32, wasmi::Error> {
                if !charge_fuel(&mut caller, costs::STORAGE_LOAD)? {
                    return Ok(1);
                }
                let key = pointer_from(&read_memory(&mut caller, ptr, 32)?);
                if let Some(value) = caller.data().writes.get(&key).copied() {
                    write_memory(&mut caller, out, &value)?;
                    return Ok(0);
                }
                match caller.data().working_set.get(&key).copied() {
                    Some(value) => {
                        caller.data_mut().loaded.insert(key, value);
                        write_memory(&mut caller, out, &value)?;
                        Ok(0)
                    }
                    None => {
                        caller.data_mut().discovered.insert(key);
                        write_memory(&mut caller, out, &[0u8; 32])?;
                        Ok(1)
                    }
                }
            },
        )?;

        linker.func_wrap(
            "env",
            "storage_store",
            |mut caller: Caller<'_, HostState>,
             ptr: u32,
             value_ptr: u32|
             -> Result<i32, wasmi::Error> {
                let per_byte = caller.data().write_cost_per_byte;
                let cost = costs::STORAGE_STORE_BASE.saturating_add(per_byte.saturating_mul(32));
                if !charge_fuel(&mut caller, cost)? {
                    return Ok(1);
                }
                let key = pointer_from(&read_memory(&mut caller, ptr, 32)?);
                let value: SlotValue = pointer_from(&read_memory(&mut caller, value_ptr, 32)?);
                caller.data_mut().writes.insert(key, value);
                Ok(0)
            },
        )?;

        linker.func_wrap(
            "env",
            "emit",
            |mut caller: Caller<'_, HostState>,
             topic_ptr: u32,
             topic_len: u32,
             data_ptr: u32,
             data_len: u32|
             -> Result<i32, wasmi::Error> {
                let cost = costs::EVENT_BASE
                    .saturating_add(costs::EVENT_DATA_PER_BYTE.saturating_mul(data_len as Gas));
                if !charge_fuel(&mut caller, cost)? {
                    return Ok(1);
                }
                let topic_bytes = read_memory(&mut caller, topic_ptr, topic_len)?;
                let data = read_memory(&mut caller, data_ptr, data_len)?;
                let topic = String::from_utf8_lossy(&topic_bytes).into_owned();
                let contract = caller.data().contract.clone();
                caller.data_mut().events.push(ContractEvent {
                    contract,
                    topic,
                    data,
                });
                Ok(0)
            },
        )?;

        linker.func_wrap(
            "env",
            "call",
            |mut caller: Caller<'_, HostState>,
             addr_ptr: u32,
             addr_len: u32,
             calldata_ptr: u32,
             calldata_len: u32|
             -> Result<i32, wasmi::Error> {
                if !charge_fuel(&mut caller, costs::CALL_BASE)? {
                    return Ok(2);
                }
                let state = caller.data();
                if state.next_call < state.call_responses.len() {
                    let index = state.next_call;
                    let state = caller.data_mut();
                    state.next_call += 1;
                    let response = state.call_responses[index].clone();
                    state.last_call_result = response.result.clone();
                    if response.success {
                        state.events.extend(response.events);
                        Ok(0)
                    } else {
                        Ok(1)
                    }
                } else {
                    let address_bytes = read_memory(&mut caller, addr_ptr, addr_len)?;
                    let calldata = read_memory(&mut caller, calldata_ptr, calldata_len)?;
                    let target = ContractAddress::new(
                        String::from_utf8_lossy(&address_bytes).into_owned(),
                    );
                    caller.data_mut().interrupt =
                        Some(Interrupt::Call(CallRequest { target, calldata }));
                    Ok(2)
                }
            },
        )?;

        linker.func_wrap(
            "env",
            "call_result_len",
            |caller: Caller<'_, HostState>| -> i32 {
                caller.data().last_call_result.len() as i32
            },
        )?;

        linker.func_wrap(
            "env",
            "call_result_copy",
            |mut caller: Caller<'_, HostState>, out: u32| -> Result<i32, wasmi::Error> {
                let result = caller.data().last_call_result.clone();
                write_memory(&mut caller, out, &result)?;
                Ok(0)
            },
        )?;

        linker.func_wrap(
            "env",
            "deploy",
            |mut caller: Caller<'_, HostState>,
             bytecode_ptr: u32,
             bytecode_len: u32,
             salt_ptr: u32,
             seed_ptr: u32,
             addr_out: u32|
             -> Result<i32, wasmi::Error> {
                if !charge_fuel(&mut caller, costs::DEPLOY_BASE)? {
                    return Ok(2);
                }
                let state = caller.data();
                if state.next_deploy < state.deploy_responses.len() {
                    let index = state.next_deploy;
                    let address = caller.data().deploy_responses[index].clone();
                    caller.data_mut().next_deploy += 1;
                    write_memory(&mut caller, addr_out, address.as_bytes())?;
                    Ok(0)
                } else {
                    let bytecode = read_memory(&mut caller, bytecode_ptr, bytecode_len)?;
                    let salt_hash = pointer_from(&read_memory(&mut caller, salt_ptr, 32)?);
                    let seed = pointer_from(&read_memory(&mut caller, seed_ptr, 32)?);
                    caller.data_mut().interrupt = Some(Interrupt::Deploy(DeployRequest {
                        bytecode,
                        salt_hash,
                        seed,
                    }));
                    Ok(2)
                }
            },
        )?;

        linker.func_wrap(
            "env",
            "revert",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<i32, wasmi::Error> {
                let reason = read_memory(&mut caller, ptr, len)?;
                caller.data_mut().interrupt = Some(Interrupt::Revert(reason));
                Ok(0)
            },
        )?;

        Ok(())
    }

    fn run_attempt(
        &self,
        input: &ExecutionInput<'_>,
    ) -> Result<(HostState, Option<Vec<u8>>, Gas, bool), EvaluationError> {
        let state = HostState {
            contract: self.contract.clone(),
            working_set: input.working_set.clone(),
            call_responses: input.call_responses.to_vec(),
            deploy_responses: input.deploy_responses.to_vec(),
            next_call: 0,
            next_deploy: 0,
            last_call_result: Vec::new(),
            write_cost_per_byte: input.write_cost_per_byte,
            writes: SlotMap::new(),
            events: Vec::new(),
            loaded: SlotMap::new(),
            discovered: BTreeSet::new(),
            interrupt: None,
        };

        let mut store = Store::new(&self.engine, state);
        store
            .set_fuel(input.gas_budget)
            .map_err(|err| EvaluationError::HostPanic(format!("fuel init failed: {err}")))?;

        let mut linker = <Linker<HostState>>::new(&self.engine);
        self.link(&mut linker)
            .map_err(|err| EvaluationError::HostPanic(format!("link failed: {err}")))?;

        let instance = linker
            .instantiate(&mut store, &self.module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|err| EvaluationError::HostPanic(format!("instantiation failed: {err}")))?;

        let memory = instance
            .get_memory(&store, "memory")
            .ok_or_else(|| EvaluationError::HostPanic("missing memory export".into()))?;
        let allocate: TypedFunc<i32, i32> = instance
            .get_typed_func(&store, "allocate")
            .map_err(|err| EvaluationError::HostPanic(format!("missing allocate: {err}")))?;
        let execute: TypedFunc<(i32, i32), i64> = instance
            .get_typed_func(&store, "execute")
            .map_err(|err| EvaluationError::HostPanic(format!("missing execute: {err}")))?;

        // Copy calldata into the guest.
        let calldata_ptr = allocate
            .call(&mut store, input.calldata.len() as i32)
            .map_err(|err| EvaluationError::HostPanic(format!("allocate trapped: {err}")))?;
        memory
            .write(&mut store, calldata_ptr as usize, input.calldata)
            .map_err(|err| EvaluationError::HostPanic(format!("calldata copy failed: {err}")))?;

        let outcome = execute.call(&mut store, (calldata_ptr, input.calldata.len() as i32));

        let fuel_left = store.get_fuel().unwrap_or(0);
        let gas_used = input.gas_budget.saturating_sub(fuel_left);

        match outcome {
            Ok(packed) => {
                let result_ptr = (packed >> 32) as u32;
                let result_len = (packed & 0xFFFF_FFFF) as u32;
                let mut result = vec![0u8; result_len as usize];
                if result_len > 0 {
                    memory
                        .read(&store, result_ptr as usize, &mut result)
                        .map_err(|err| {
                            EvaluationError::HostPanic(format!("result read failed: {err}"))
                        })?;
                }
                Ok((store.into_data(), Some(result), gas_used, false))
            }
            Err(err) => {
                let out_of_fuel = fuel_left == 0;
                let state = store.into_data();
                if state.interrupt.is_none() && !out_of_fuel {
                    warn!(contract = %self.contract, error = %err, "guest trapped");
                    return Err(EvaluationError::HostPanic(format!("guest trap: {err}")));
                }
                Ok((state, None, gas_used, out_of_fuel))
            }
        }
    }
}

impl RuntimeInstance for WasmInstance {
    fn required_slots(&mut self, _calldata: &[u8]) -> Result<Vec<StoragePointer>, EvaluationError> {
        // Declared working sets are optional; contracts without the export
        // rely entirely on discovery.
        let state = HostState {
            contract: self.contract.clone(),
            working_set: SlotMap::new(),
            call_responses: Vec::new(),
            deploy_responses: Vec::new(),
            next_call: 0,
            next_deploy: 0,
            last_call_result: Vec::new(),
            write_cost_per_byte: 0,
            writes: SlotMap::new(),
            events: Vec::new(),
            loaded: SlotMap::new(),
            discovered: BTreeSet::new(),
            interrupt: None,
        };
        let mut store = Store::new(&self.engine, state);
        store
            .set_fuel(costs::EXECUTION_BASE)
            .map_err(|err| EvaluationError::HostPanic(format!("fuel init failed: {err}")))?;

        let mut linker = <Linker<HostState>>::new(&self.engine);
        self.link(&mut linker)
            .map_err(|err| EvaluationError::HostPanic(format!("link failed: {err}")))?;
        let instance = linker
            .instantiate(&mut store, &self.module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|err| EvaluationError::HostPanic(format!("instantiation failed: {err}")))?;

        let required = match instance.get_typed_func::<(), i64>(&store, "required_slots") {
            Ok(func) => func,
            Err(_) => return Ok(Vec::new()),
        };
        let memory = instance
            .get_memory(&store, "memory")
            .ok_or_else(|| EvaluationError::HostPanic("missing memory export".into()))?;

        let packed = required
            .call(&mut store, ())
            .map_err(|err| EvaluationError::HostPanic(format!("required_slots trapped: {err}")))?;
        let ptr = (packed >> 32) as usize;
        let len = (packed & 0xFFFF_FFFF) as usize;
        let mut buffer = vec![0u8; len];
        memory
            .read(&store, ptr, &mut buffer)
            .map_err(|err| EvaluationError::HostPanic(format!("slot list read failed: {err}")))?;

        Ok(buffer
            .chunks_exact(32)
            .map(pointer_from)
            .collect())
    }

    fn execute(&mut self, input: &ExecutionInput<'_>) -> Result<ExecutionEffects, EvaluationError> {
        let (state, result, gas_used, out_of_fuel) = self.run_attempt(input)?;

        let status = match state.interrupt {
            Some(Interrupt::Revert(reason)) => ExecStatus::Reverted(reason),
            Some(Interrupt::Call(request)) => ExecStatus::NeedsCall(request),
            Some(Interrupt::Deploy(request)) => ExecStatus::NeedsDeploy(request),
            None if out_of_fuel => ExecStatus::OutOfGas,
            None => ExecStatus::Done(result.unwrap_or_default()),
        };

        Ok(ExecutionEffects {
            status,
            writes: state.writes,
            events: state.events,
            loaded: state.loaded,
            discovered: state.discovered,
            gas_used,
        })
    }
}
