//! # Contract Evaluator
//!
//! Orchestrates the attempt loop: loads working sets, resolves external
//! calls and deployments, merges child effects, and enforces gas, depth,
//! and reentrancy limits.

use crate::deploy::{derive_contract_address, derive_tweaked_key};
use crate::errors::EvaluationError;
use crate::gas::{costs, GasTracker};
use crate::params::{
    AccessList, ContractSlots, EvaluationOutcome, EvaluationParams, EvaluationResult, SlotMap,
};
use crate::runtime::{CallResult, ContractRuntime, ExecStatus, ExecutionInput};
use shared_types::{
    ConsensusRuleset, ContractAddress, ContractEvent, ContractInformation, DeploymentPayload, Gas,
    SlotValue, StoragePointer,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Upper bound on attempts per frame; a contract that keeps growing its
/// working set past this is treated as non-stabilizing and reverted.
const MAX_ATTEMPTS: u32 = 256;

/// Bytecode lookup for evaluation.
pub trait ContractSource: Send + Sync {
    fn get_contract(
        &self,
        address: &ContractAddress,
        at_height: u64,
    ) -> Result<Option<ContractInformation>, EvaluationError>;
}

/// Storage-slot lookup for evaluation. Implementations serve the snapshot
/// the block executes against (persisted state plus in-block writes).
pub trait SlotSource: Send + Sync {
    fn load_slot(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Result<Option<SlotValue>, EvaluationError>;
}

/// Execution limits drawn from the active consensus ruleset.
#[derive(Debug, Clone)]
pub struct VmLimits {
    pub max_call_depth: u32,
    pub max_deploy_depth: u32,
    pub reentrancy_guard: bool,
    pub write_cost_per_byte: Gas,
    pub max_gas_per_tx: Gas,
}

impl From<&ConsensusRuleset> for VmLimits {
    fn from(ruleset: &ConsensusRuleset) -> Self {
        Self {
            max_call_depth: ruleset.max_call_depth,
            max_deploy_depth: ruleset.max_deploy_depth,
            reentrancy_guard: ruleset.reentrancy_guard,
            write_cost_per_byte: ruleset.storage_write_cost_per_byte,
            max_gas_per_tx: ruleset.max_gas_per_tx,
        }
    }
}

/// The deterministic contract evaluator.
pub struct ContractEvaluator {
    runtime: Arc<dyn ContractRuntime>,
    contracts: Arc<dyn ContractSource>,
    slots: Arc<dyn SlotSource>,
    limits: VmLimits,
}

/// Output of one call frame, merged upward on success.
struct CallOutput {
    result: Vec<u8>,
    events: Vec<ContractEvent>,
    writes: ContractSlots,
    loaded: ContractSlots,
    deployed: Vec<ContractInformation>,
}

struct FrameCtx<'a> {
    gas: &'a mut GasTracker,
    stack: &'a mut Vec<ContractAddress>,
    depth: u32,
    deploy_depth: u32,
    height: u64,
    /// Writes already visible to this frame: ancestors' partial writes
    /// plus completed sibling calls.
    overlay: ContractSlots,
    preloaded: &'a ContractSlots,
    access_list: Option<&'a AccessList>,
}

impl ContractEvaluator {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContractRuntime>,
        contracts: Arc<dyn ContractSource>,
        slots: Arc<dyn SlotSource>,
        limits: VmLimits,
    ) -> Self {
        Self {
            runtime,
            contracts,
            slots,
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &VmLimits {
        &self.limits
    }

    /// Evaluate an interaction transaction (or a read-only `view` call).
    ///
    /// Recoverable failures (revert, out-of-gas, depth, reentrancy) are
    /// folded into the result's outcome. `Err` is reserved for a missing
    /// top-level contract and for block-fatal failures (host panic,
    /// storage errors).
    pub fn execute(&self, params: &EvaluationParams) -> Result<EvaluationResult, EvaluationError> {
        let gas_limit = params.gas_limit.min(self.limits.max_gas_per_tx);
        let mut gas = GasTracker::new(gas_limit);

        // The target must exist before any gas is burned.
        if self
            .contracts
            .get_contract(&params.contract, params.block.height)?
            .is_none()
        {
            return Err(EvaluationError::MissingContract(params.contract.clone()));
        }

        if gas.charge(costs::EXECUTION_BASE).is_err() {
            return Ok(EvaluationResult::failed(EvaluationOutcome::OutOfGas, gas.used()));
        }

        let mut stack = Vec::new();
        let ctx = FrameCtx {
            gas: &mut gas,
            stack: &mut stack,
            depth: 0,
            deploy_depth: 0,
            height: params.block.height,
            overlay: ContractSlots::new(),
            preloaded: &params.preloaded_storage,
            access_list: params.access_list.as_ref(),
        };

        match self.evaluate_call(&params.contract, &params.calldata, ctx) {
            Ok(output) => Ok(EvaluationResult {
                outcome: EvaluationOutcome::Ok,
                result: output.result,
                events: output.events,
                storage_writes: output.writes,
                loaded_storage: output.loaded,
                deployed_contracts: output.deployed,
                gas_used: gas.used(),
            }),
            Err(err) => self.fold_failure(err, gas),
        }
    }

    /// Evaluate a deployment transaction. The address is derived from
    /// (deployer public key, salt hash, seed); duplicates are rejected.
    pub fn execute_deployment(
        &self,
        payload: &DeploymentPayload,
        height: u64,
    ) -> Result<EvaluationResult, EvaluationError> {
        let gas_limit = payload.gas_limit.min(self.limits.max_gas_per_tx);
        let mut gas = GasTracker::new(gas_limit);

        if gas
            .charge(costs::EXECUTION_BASE.saturating_add(costs::DEPLOY_BASE))
            .is_err()
        {
            return Ok(EvaluationResult::failed(EvaluationOutcome::OutOfGas, gas.used()));
        }

        let address =
            derive_contract_address(&payload.deployer_public_key, &payload.salt_hash, &payload.seed);
        if self.contracts.get_contract(&address, height)?.is_some() {
            return self.fold_failure(EvaluationError::AlreadyDeployed(address), gas);
        }

        let info = ContractInformation {
            address: address.clone(),
            tweaked_public_key: derive_tweaked_key(
                &payload.deployer_public_key,
                &payload.salt_hash,
                &payload.seed,
            ),
            deployed_at_height: height,
            bytecode: payload.bytecode.clone(),
            deployer_public_key: payload.deployer_public_key.clone(),
            salt_hash: payload.salt_hash,
            seed: payload.seed,
        };

        debug!(contract = %address, height, "contract deployment queued");
        Ok(EvaluationResult {
            outcome: EvaluationOutcome::Ok,
            result: address.as_bytes().to_vec(),
            events: Vec::new(),
            storage_writes: ContractSlots::new(),
            loaded_storage: ContractSlots::new(),
            deployed_contracts: vec![info],
            gas_used: gas.used(),
        })
    }

    fn fold_failure(
        &self,
        err: EvaluationError,
        gas: GasTracker,
    ) -> Result<EvaluationResult, EvaluationError> {
        let outcome = match err {
            EvaluationError::Revert(reason) => EvaluationOutcome::Revert(reason),
            EvaluationError::OutOfGas => {
                return Ok(EvaluationResult::failed(
                    EvaluationOutcome::OutOfGas,
                    gas.limit(),
                ));
            }
            EvaluationError::DepthExceeded(_) => EvaluationOutcome::DepthExceeded,
            EvaluationError::Reentrancy(addr) => EvaluationOutcome::Reentrancy(addr),
            EvaluationError::AlreadyDeployed(addr) => {
                EvaluationOutcome::Revert(format!("already deployed: {addr}").into_bytes())
            }
            other => return Err(other),
        };
        Ok(EvaluationResult::failed(outcome, gas.used()))
    }

    fn evaluate_call(
        &self,
        target: &ContractAddress,
        calldata: &[u8],
        mut ctx: FrameCtx<'_>,
    ) -> Result<CallOutput, EvaluationError> {
        if ctx.depth > self.limits.max_call_depth {
            return Err(EvaluationError::DepthExceeded(ctx.depth));
        }
        if self.limits.reentrancy_guard && ctx.stack.contains(target) {
            return Err(EvaluationError::Reentrancy(target.clone()));
        }

        let contract = self
            .contracts
            .get_contract(target, ctx.height)?
            .ok_or_else(|| EvaluationError::MissingContract(target.clone()))?;

        ctx.stack.push(target.clone());
        let output = self.run_frame(&contract, calldata, &mut ctx);
        ctx.stack.pop();
        output
    }

    #[allow(clippy::too_many_lines)]
    fn run_frame(
        &self,
        contract: &ContractInformation,
        calldata: &[u8],
        ctx: &mut FrameCtx<'_>,
    ) -> Result<CallOutput, EvaluationError> {
        let target = contract.address.clone();

        let mut working = SlotMap::new();
        if let Some(list) = ctx.access_list {
            for (list_contract, pointer) in list.iter() {
                if *list_contract == target {
                    self.load_into(&mut working, &ctx.overlay, ctx.preloaded, &target, pointer)?;
                }
            }
        }

        let mut call_responses: Vec<CallResult> = Vec::new();
        let mut deploy_responses: Vec<ContractAddress> = Vec::new();
        let mut child_writes = ContractSlots::new();
        let mut child_loaded = ContractSlots::new();
        let mut deployed: Vec<ContractInformation> = Vec::new();
        let mut nested_deploys = ctx.deploy_depth;

        for attempt in 0..MAX_ATTEMPTS {
            let mut instance = self.runtime.instantiate(&target, &contract.bytecode)?;

            if attempt == 0 {
                for pointer in instance.required_slots(calldata)? {
                    self.load_into(&mut working, &ctx.overlay, ctx.preloaded, &target, &pointer)?;
                }
            }

            let input = ExecutionInput {
                calldata,
                working_set: &working,
                call_responses: &call_responses,
                deploy_responses: &deploy_responses,
                gas_budget: ctx.gas.remaining(),
                write_cost_per_byte: self.limits.write_cost_per_byte,
            };
            let effects = instance.execute(&input)?;
            trace!(
                contract = %target,
                attempt,
                status = ?effects.status,
                discovered = effects.discovered.len(),
                "attempt finished"
            );

            match effects.status {
                ExecStatus::Done(result) => {
                    if !effects.discovered.is_empty() {
                        // The required set grew; enlarge and re-execute.
                        for pointer in &effects.discovered {
                            self.load_into(
                                &mut working,
                                &ctx.overlay,
                                ctx.preloaded,
                                &target,
                                pointer,
                            )?;
                        }
                        continue;
                    }
                    ctx.gas.charge(effects.gas_used)?;

                    let mut writes = child_writes;
                    writes
                        .entry(target.clone())
                        .or_default()
                        .extend(effects.writes);
                    let mut loaded = child_loaded;
                    loaded
                        .entry(target.clone())
                        .or_default()
                        .extend(effects.loaded);

                    return Ok(CallOutput {
                        result,
                        events: effects.events,
                        writes,
                        loaded,
                        deployed,
                    });
                }
                ExecStatus::Reverted(reason) => {
                    ctx.gas.charge(effects.gas_used)?;
                    return Err(EvaluationError::Revert(reason));
                }
                ExecStatus::OutOfGas => {
                    let remaining = ctx.gas.remaining();
                    let _ = ctx.gas.charge(remaining);
                    return Err(EvaluationError::OutOfGas);
                }
                ExecStatus::NeedsCall(request) => {
                    // Reserve the parent's partial consumption while the
                    // child runs, then release it; the final attempt
                    // re-charges the parent's own work exactly once.
                    ctx.gas.charge(effects.gas_used)?;

                    let mut child_overlay = ctx.overlay.clone();
                    merge_slots(&mut child_overlay, &child_writes);
                    child_overlay
                        .entry(target.clone())
                        .or_default()
                        .extend(effects.writes.clone());

                    let child_ctx = FrameCtx {
                        gas: &mut *ctx.gas,
                        stack: &mut *ctx.stack,
                        depth: ctx.depth + 1,
                        deploy_depth: nested_deploys,
                        height: ctx.height,
                        overlay: child_overlay,
                        preloaded: ctx.preloaded,
                        access_list: ctx.access_list,
                    };
                    match self.evaluate_call(&request.target, &request.calldata, child_ctx) {
                        Ok(output) => {
                            merge_slots(&mut child_writes, &output.writes);
                            merge_slots(&mut child_loaded, &output.loaded);
                            deployed.extend(output.deployed);
                            call_responses.push(CallResult {
                                success: true,
                                result: output.result,
                                events: output.events,
                            });
                        }
                        Err(EvaluationError::Revert(_))
                        | Err(EvaluationError::MissingContract(_)) => {
                            // Child writes are discarded; consumed gas
                            // stays consumed.
                            call_responses.push(CallResult {
                                success: false,
                                result: Vec::new(),
                                events: Vec::new(),
                            });
                        }
                        Err(fatal) => return Err(fatal),
                    }
                    ctx.gas.refund(effects.gas_used);
                }
                ExecStatus::NeedsDeploy(request) => {
                    ctx.gas.charge(effects.gas_used)?;

                    nested_deploys += 1;
                    if nested_deploys > self.limits.max_deploy_depth {
                        return Err(EvaluationError::DepthExceeded(nested_deploys));
                    }

                    let address = derive_contract_address(
                        target.as_bytes(),
                        &request.salt_hash,
                        &request.seed,
                    );
                    let exists = self.contracts.get_contract(&address, ctx.height)?.is_some()
                        || deployed.iter().any(|d| d.address == address);
                    if exists {
                        return Err(EvaluationError::AlreadyDeployed(address));
                    }

                    deployed.push(ContractInformation {
                        address: address.clone(),
                        tweaked_public_key: derive_tweaked_key(
                            target.as_bytes(),
                            &request.salt_hash,
                            &request.seed,
                        ),
                        deployed_at_height: ctx.height,
                        bytecode: request.bytecode,
                        deployer_public_key: target.as_bytes().to_vec(),
                        salt_hash: request.salt_hash,
                        seed: request.seed,
                    });
                    deploy_responses.push(address);
                    ctx.gas.refund(effects.gas_used);
                }
            }
        }

        Err(EvaluationError::Revert(
            b"evaluation did not stabilize".to_vec(),
        ))
    }

    fn load_into(
        &self,
        working: &mut SlotMap,
        overlay: &ContractSlots,
        preloaded: &ContractSlots,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Result<(), EvaluationError> {
        if working.contains_key(pointer) {
            return Ok(());
        }
        let value = overlay
            .get(contract)
            .and_then(|slots| slots.get(pointer))
            .copied()
            .or_else(|| {
                preloaded
                    .get(contract)
                    .and_then(|slots| slots.get(pointer))
                    .copied()
            });
        let value = match value {
            Some(value) => value,
            None => self
                .slots
                .load_slot(contract, pointer)?
                .unwrap_or([0u8; 32]),
        };
        working.insert(*pointer, value);
        Ok(())
    }
}

fn merge_slots(into: &mut ContractSlots, from: &ContractSlots) {
    for (contract, slots) in from {
        into.entry(contract.clone()).or_default().extend(slots.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryWorld, ScriptStep, ScriptedContract};
    use shared_types::ZERO_HASH;

    fn pointer(n: u8) -> StoragePointer {
        let mut p = [0u8; 32];
        p[0] = n;
        p
    }

    fn value(n: u8) -> SlotValue {
        let mut v = [0u8; 32];
        v[31] = n;
        v
    }

    fn params(contract: &ContractAddress, gas: Gas) -> EvaluationParams {
        EvaluationParams::call(contract.clone(), vec![0x01], gas)
    }

    #[test]
    fn test_simple_write_and_event() {
        let world = InMemoryWorld::new();
        let addr = world.register(
            "alpha",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlot(pointer(0xAA), value(1)))
                .step(ScriptStep::Emit {
                    topic: "Transfer".into(),
                    data: vec![1, 2, 3],
                })
                .returns(vec![0xFE]),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&addr, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        assert_eq!(result.result, vec![0xFE]);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.storage_writes[&addr][&pointer(0xAA)], value(1));
        assert!(result.gas_used >= costs::EXECUTION_BASE);
    }

    #[test]
    fn test_discovery_loop_stabilizes() {
        let world = InMemoryWorld::new();
        world.seed_slot("beta", pointer(1), value(7));
        // The contract reads slot 1 (undeclared), then writes slot 2 with
        // the value it found: a data-dependent footprint.
        let addr = world.register(
            "beta",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlotFromRead {
                    read: pointer(1),
                    write: pointer(2),
                })
                .returns(vec![]),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&addr, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        assert_eq!(result.storage_writes[&addr][&pointer(2)], value(7));
        // The discovered read is reported as loaded storage.
        assert_eq!(result.loaded_storage[&addr][&pointer(1)], value(7));
    }

    #[test]
    fn test_preloaded_storage_wins_over_source() {
        let world = InMemoryWorld::new();
        world.seed_slot("gamma", pointer(1), value(7));
        let addr = world.register(
            "gamma",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlotFromRead {
                    read: pointer(1),
                    write: pointer(2),
                })
                .returns(vec![]),
        );
        let evaluator = world.evaluator();

        let mut p = params(&addr, 10_000_000);
        let mut slots = SlotMap::new();
        slots.insert(pointer(1), value(42));
        p.preloaded_storage.insert(addr.clone(), slots);

        let result = evaluator.execute(&p).unwrap();
        assert_eq!(result.storage_writes[&addr][&pointer(2)], value(42));
    }

    #[test]
    fn test_out_of_gas_pins_gas_to_limit() {
        let world = InMemoryWorld::new();
        let addr = world.register(
            "delta",
            ScriptedContract::new().step(ScriptStep::BurnGas(50_000)),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&addr, 30_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::OutOfGas);
        assert_eq!(result.gas_used, 30_000);
        assert!(result.storage_writes.is_empty());
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_revert_discards_writes_keeps_gas() {
        let world = InMemoryWorld::new();
        let addr = world.register(
            "epsilon",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlot(pointer(1), value(1)))
                .step(ScriptStep::Revert(vec![0xDE, 0xAD])),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&addr, 1_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Revert(vec![0xDE, 0xAD]));
        assert!(result.storage_writes.is_empty());
        assert!(result.gas_used > 0);
    }

    #[test]
    fn test_missing_contract_is_an_error() {
        let world = InMemoryWorld::new();
        let evaluator = world.evaluator();
        let ghost = ContractAddress::new("oc1unknown");
        assert!(matches!(
            evaluator.execute(&params(&ghost, 1_000_000)),
            Err(EvaluationError::MissingContract(_))
        ));
    }

    #[test]
    fn test_external_call_merges_child_writes() {
        let world = InMemoryWorld::new();
        let callee = world.register(
            "callee",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlot(pointer(9), value(9)))
                .step(ScriptStep::Emit {
                    topic: "ChildDone".into(),
                    data: vec![],
                })
                .returns(vec![0x99]),
        );
        let caller = world.register(
            "caller",
            ScriptedContract::new()
                .step(ScriptStep::CallContract {
                    target: callee.clone(),
                    calldata: vec![0x02],
                })
                .step(ScriptStep::WriteSlot(pointer(1), value(1)))
                .returns(vec![0x11]),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&caller, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        assert_eq!(result.storage_writes[&callee][&pointer(9)], value(9));
        assert_eq!(result.storage_writes[&caller][&pointer(1)], value(1));
        // Child event is spliced before the caller's trailing work.
        assert_eq!(result.events[0].topic, "ChildDone");
    }

    #[test]
    fn test_child_revert_is_survivable() {
        let world = InMemoryWorld::new();
        let callee = world.register(
            "callee",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlot(pointer(9), value(9)))
                .step(ScriptStep::Revert(vec![0x01])),
        );
        let caller = world.register(
            "caller",
            ScriptedContract::new()
                .step(ScriptStep::CallContract {
                    target: callee.clone(),
                    calldata: vec![],
                })
                .step(ScriptStep::WriteSlot(pointer(1), value(1)))
                .returns(vec![]),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&caller, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        // The reverted child's write never landed.
        assert!(!result.storage_writes.contains_key(&callee));
        assert_eq!(result.storage_writes[&caller][&pointer(1)], value(1));
    }

    #[test]
    fn test_reentrancy_is_rejected() {
        let world = InMemoryWorld::new();
        // A calls B, B calls A again.
        let a_addr = world.address_of("re-a");
        let b = world.register(
            "re-b",
            ScriptedContract::new().step(ScriptStep::CallContract {
                target: a_addr.clone(),
                calldata: vec![],
            }),
        );
        let a = world.register(
            "re-a",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlot(pointer(1), value(1)))
                .step(ScriptStep::CallContract {
                    target: b.clone(),
                    calldata: vec![],
                }),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&a, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Reentrancy(a.clone()));
        assert!(result.storage_writes.is_empty());
    }

    #[test]
    fn test_call_depth_limit() {
        let world = InMemoryWorld::new();
        // A chain of contracts each calling the next, longer than the limit.
        let depth = world.evaluator().limits().max_call_depth as usize + 2;
        let mut next: Option<ContractAddress> = None;
        let mut first = None;
        for i in (0..depth).rev() {
            let name = format!("chain-{i}");
            let mut script = ScriptedContract::new();
            if let Some(target) = next.take() {
                script = script.step(ScriptStep::CallContract {
                    target,
                    calldata: vec![],
                });
            }
            let addr = world.register(&name, script.returns(vec![]));
            first = Some(addr.clone());
            next = Some(addr);
        }
        let evaluator = world.evaluator();

        let result = evaluator
            .execute(&params(&first.unwrap(), 100_000_000))
            .unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::DepthExceeded);
    }

    #[test]
    fn test_nested_deploy_queues_contract() {
        let world = InMemoryWorld::new();
        let factory = world.register(
            "factory",
            ScriptedContract::new()
                .step(ScriptStep::Deploy {
                    bytecode: vec![0x00, 0x61, 0x73, 0x6D],
                    salt_hash: [5u8; 32],
                    seed: [6u8; 32],
                })
                .returns(vec![]),
        );
        let evaluator = world.evaluator();

        let result = evaluator.execute(&params(&factory, 10_000_000)).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        assert_eq!(result.deployed_contracts.len(), 1);
        let info = &result.deployed_contracts[0];
        assert_eq!(
            info.address,
            derive_contract_address(factory.as_bytes(), &[5u8; 32], &[6u8; 32])
        );
        assert_eq!(info.deployer_public_key, factory.as_bytes().to_vec());
    }

    #[test]
    fn test_deployment_transaction_and_duplicate_rejection() {
        let world = InMemoryWorld::new();
        let evaluator = world.evaluator();
        let payload = DeploymentPayload {
            bytecode: vec![0x00, 0x61, 0x73, 0x6D],
            deployer_public_key: vec![2u8; 33],
            salt_hash: [1u8; 32],
            seed: [2u8; 32],
            calldata: vec![],
            gas_limit: 10_000_000,
            gas_sat_fee: 1_000,
            priority_fee: 0,
        };

        let result = evaluator.execute_deployment(&payload, 100).unwrap();
        assert_eq!(result.outcome, EvaluationOutcome::Ok);
        let info = result.deployed_contracts[0].clone();
        assert_eq!(info.salt_hash, [1u8; 32]);
        assert_ne!(info.tweaked_public_key, ZERO_HASH.to_vec());

        // Register the deployment, then retry: duplicate is rejected.
        world.install(info);
        let retry = evaluator.execute_deployment(&payload, 101).unwrap();
        assert!(matches!(retry.outcome, EvaluationOutcome::Revert(_)));
    }

    #[test]
    fn test_determinism_identical_runs() {
        let world = InMemoryWorld::new();
        world.seed_slot("det", pointer(1), value(5));
        let addr = world.register(
            "det",
            ScriptedContract::new()
                .step(ScriptStep::WriteSlotFromRead {
                    read: pointer(1),
                    write: pointer(2),
                })
                .step(ScriptStep::Emit {
                    topic: "E".into(),
                    data: vec![9],
                })
                .returns(vec![0x01]),
        );
        let evaluator = world.evaluator();

        let a = evaluator.execute(&params(&addr, 5_000_000)).unwrap();
        let b = evaluator.execute(&params(&addr, 5_000_000)).unwrap();
        assert_eq!(a.result, b.result);
        assert_eq!(a.events, b.events);
        assert_eq!(a.storage_writes, b.storage_writes);
        assert_eq!(a.gas_used, b.gas_used);
    }
}
