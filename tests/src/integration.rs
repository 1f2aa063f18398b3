//! End-to-end flows: raw base-chain blocks through prefetch,
//! classification, execution, commitment, hooks, and the API surface.

use crate::harness::{generic_tx, spend_input, tag_hash, TestNode};
use opx_api::{ApiLimits, BalanceQueryService, BlockQueryService, EpochQueryService};
use opx_hooks::{HookEvent, Plugin, PluginError};
use opx_indexer::classify::{build_envelope_script, KIND_DEPLOYMENT, KIND_INTERACTION};
use opx_merkle::StateTree;
use opx_utxo::script::p2wpkh_script;
use opx_vm::deploy::derive_contract_address;
use opx_vm::testing::{ScriptStep, ScriptedContract};
use shared_types::{
    encoding, DeploymentPayload, InteractionPayload, ReceiptStatus, TransactionOutput,
};
use std::collections::HashSet;
use std::sync::Arc;

fn envelope_output(kind: u8, payload: &[u8]) -> TransactionOutput {
    TransactionOutput {
        value: 0,
        script_pub_key: build_envelope_script(kind, payload),
        address: None,
    }
}

fn pointer(n: u8) -> [u8; 32] {
    let mut p = [0u8; 32];
    p[0] = n;
    p
}

fn value(n: u8) -> [u8; 32] {
    let mut v = [0u8; 32];
    v[31] = n;
    v
}

/// Deploy at H, write a slot at H+1, and verify the storage root is the
/// root of the single-leaf tree with a valid membership proof.
#[tokio::test]
async fn deploy_then_write_commits_single_leaf_root() {
    let node = TestNode::new().await;
    let salt = [1u8; 32];
    let seed = [2u8; 32];
    let deployer = vec![2u8; 33];
    let contract = derive_contract_address(&deployer, &salt, &seed);

    // The deployed bytecode behaves as "write 0x01 into slot 0xAA".
    node.world.register_script_at(
        contract.clone(),
        ScriptedContract::new()
            .step(ScriptStep::WriteSlot(pointer(0xAA), value(0x01)))
            .returns(vec![]),
    );

    for height in 1..=99 {
        node.push_block(height, vec![]);
    }
    let deployment = DeploymentPayload {
        bytecode: vec![0x00, 0x61, 0x73, 0x6D],
        deployer_public_key: deployer,
        salt_hash: salt,
        seed,
        calldata: vec![],
        gas_limit: 10_000_000,
        gas_sat_fee: 1_000,
        priority_fee: 0,
    };
    let mut deploy_tx = generic_tx(100, 100, vec![envelope_output(
        KIND_DEPLOYMENT,
        &bincode::serialize(&deployment).unwrap(),
    )]);
    deploy_tx.hash = tag_hash(100);
    node.push_block(100, vec![deploy_tx]);

    let interaction = InteractionPayload {
        contract: contract.clone(),
        calldata: vec![0x01],
        gas_limit: 10_000_000,
        gas_sat_fee: 1_000,
        priority_fee: 0,
        from_public_key: vec![2u8; 33],
        preimage: None,
        reward: None,
    };
    let write_tx = generic_tx(101, 101, vec![envelope_output(
        KIND_INTERACTION,
        &bincode::serialize(&interaction).unwrap(),
    )]);
    node.push_block(101, vec![write_tx]);

    node.scheduler.tick().await.unwrap();

    // The deployment registered the contract at 100.
    let info = node.storage.get_contract(&contract, Some(100)).unwrap().unwrap();
    assert_eq!(info.deployed_at_height, 100);
    assert!(node.storage.get_contract(&contract, Some(99)).unwrap().is_none());

    // The write is visible at 101 and not before.
    assert_eq!(
        node.storage.get_slot(&contract, &pointer(0xAA), 101).unwrap(),
        Some(value(0x01))
    );
    assert_eq!(node.storage.get_slot(&contract, &pointer(0xAA), 100).unwrap(), None);

    // The block's storage root is exactly the single-leaf tree root, and
    // the leaf proof verifies against it.
    let header = node.storage.get_block_header(101).unwrap().unwrap();
    let mut expected = StateTree::new();
    expected
        .update_value(&contract, pointer(0xAA), value(0x01))
        .unwrap();
    assert_eq!(header.storage_root, expected.root());

    let (slot_value, root, proof) = expected
        .get_value_with_proof(&contract, &pointer(0xAA))
        .unwrap();
    assert_eq!(root, header.storage_root);
    assert!(StateTree::verify(root, &contract, &pointer(0xAA), &slot_value, &proof));

    // Checksum chain held across the whole range.
    let parent = node.storage.get_block_header(100).unwrap().unwrap();
    assert_eq!(header.previous_block_checksum, parent.checksum_root);
}

/// Transfer: outputs spent in a later block are tombstoned with the
/// spending height and balances move.
#[tokio::test]
async fn transfer_tombstones_inputs_and_moves_balance() {
    let node = TestNode::new().await;
    let script_a = p2wpkh_script(&[0xA1; 20]);
    let script_b = p2wpkh_script(&[0xB2; 20]);
    let addr_a = opx_utxo::classify_script(&script_a).unwrap();
    let addr_b = opx_utxo::classify_script(&script_b).unwrap();

    node.push_block(
        1,
        vec![generic_tx(
            1,
            1,
            vec![TransactionOutput {
                value: 10_000,
                script_pub_key: script_a,
                address: None,
            }],
        )],
    );
    let mut spend = generic_tx(
        2,
        2,
        vec![TransactionOutput {
            value: 9_000,
            script_pub_key: script_b,
            address: None,
        }],
    );
    spend.inputs = vec![spend_input(1, 0)];
    node.push_block(2, vec![spend]);

    node.scheduler.tick().await.unwrap();

    let spent = node.storage.get_unspent_output(&tag_hash(1), 0).unwrap().unwrap();
    assert_eq!(spent.deleted_at_block, Some(2));
    assert_eq!(node.ledger.balance_of(&addr_a, false).unwrap(), 0);
    assert_eq!(node.ledger.balance_of(&addr_b, false).unwrap(), 9_000);

    let balances = BalanceQueryService::new(node.ledger.clone(), ApiLimits::default());
    assert_eq!(
        balances.get_balance(&addr_b.to_string(), false).unwrap(),
        encoding::u64_to_hex(9_000)
    );
}

/// Reorg: the replaced spend unwinds, the spent output is live again,
/// and plugins see exactly one reorg event before the re-indexed blocks.
#[tokio::test]
async fn reorg_restores_outputs_and_orders_events() {
    let node = TestNode::new().await;
    let script_a = p2wpkh_script(&[0xA1; 20]);
    let addr_a = opx_utxo::classify_script(&script_a).unwrap();

    node.push_block(
        1,
        vec![generic_tx(
            1,
            1,
            vec![TransactionOutput {
                value: 10_000,
                script_pub_key: script_a,
                address: None,
            }],
        )],
    );
    let mut spend = generic_tx(2, 2, vec![]);
    spend.inputs = vec![spend_input(1, 0)];
    node.push_block(2, vec![spend]);
    node.push_block(3, vec![]);
    node.scheduler.tick().await.unwrap();
    assert_eq!(node.ledger.balance_of(&addr_a, false).unwrap(), 0);

    // The base chain replaces heights 2-3 without the spend.
    node.chain.fork_from(2, vec![
        shared_types::RawBlock {
            height: 2,
            hash: [0xF2; 32],
            previous_block_hash: [0u8; 32],
            time: 0,
            median_time: 0,
            transactions: vec![],
        },
        shared_types::RawBlock {
            height: 3,
            hash: [0xF3; 32],
            previous_block_hash: [0xF2; 32],
            time: 0,
            median_time: 0,
            transactions: vec![],
        },
    ]);

    node.scheduler.tick().await.unwrap(); // detects + rolls back
    node.scheduler.tick().await.unwrap(); // re-indexes

    assert_eq!(node.storage.max_block_height().unwrap(), Some(3));
    assert_eq!(
        node.storage.get_block_header(3).unwrap().unwrap().hash,
        [0xF3; 32]
    );
    // The fork restored the spent output.
    assert!(node.storage.get_unspent_output(&tag_hash(1), 0).unwrap().unwrap().is_live());
    assert_eq!(node.ledger.balance_of(&addr_a, false).unwrap(), 10_000);

    // Exactly one reorg event, after the first indexing pass and before
    // the re-indexed BlockChange events.
    let entries = node.events.entries();
    assert_eq!(
        entries,
        vec![
            "block:1", "block:2", "block:3", "reorg:2-3", "block:2", "block:3",
        ]
    );
}

/// Out-of-gas transactions are included with their receipt, consume
/// exactly the gas limit, and leave no state behind.
#[tokio::test]
async fn out_of_gas_transaction_is_included_without_state() {
    let node = TestNode::new().await;
    let contract = node.world.register(
        "hungry",
        ScriptedContract::new().step(ScriptStep::BurnGas(1_500)),
    );
    // The processor resolves contracts from storage, not the test world.
    node.storage
        .insert_contract(
            &shared_types::ContractInformation {
                address: contract.clone(),
                tweaked_public_key: vec![3u8; 32],
                deployed_at_height: 0,
                bytecode: b"hungry".to_vec(),
                deployer_public_key: vec![2u8; 33],
                salt_hash: [0u8; 32],
                seed: [0u8; 32],
            },
            None,
        )
        .unwrap();

    let interaction = InteractionPayload {
        contract: contract.clone(),
        calldata: vec![],
        gas_limit: 1_000,
        gas_sat_fee: 100,
        priority_fee: 0,
        from_public_key: vec![2u8; 33],
        preimage: None,
        reward: None,
    };
    let tx = generic_tx(7, 1, vec![envelope_output(
        KIND_INTERACTION,
        &bincode::serialize(&interaction).unwrap(),
    )]);
    node.push_block(1, vec![tx]);
    node.scheduler.tick().await.unwrap();

    let stored = node.storage.get_transaction_by_hash(&tag_hash(7)).unwrap().unwrap();
    let receipt = stored.receipt.unwrap();
    assert_eq!(receipt.status, ReceiptStatus::OutOfGas);
    assert_eq!(receipt.gas_used, 1_000);
    assert!(receipt.events.is_empty());
    assert_eq!(
        node.storage.get_block_header(1).unwrap().unwrap().storage_root,
        opx_merkle::MerkleTree::empty_root()
    );
}

/// The preimage endpoint serves epoch E−2 and refreshes after block
/// change invalidation.
#[tokio::test]
async fn preimage_endpoint_lags_two_epochs() {
    let node = TestNode::new().await;
    // Genesis epoch length is 5: epochs open at heights 5, 10, 15.
    for height in 1..=15 {
        node.push_block(height, vec![]);
    }
    node.scheduler.tick().await.unwrap();

    let active = node.storage.get_active_epoch().unwrap().unwrap();
    assert_eq!(active.number, 3);

    let epochs = EpochQueryService::new(node.storage.clone());
    let preimage = epochs.get_preimage().unwrap();
    assert_eq!(preimage.epoch_number, Some(1));

    // A new epoch opens; the cached response survives until invalidated.
    for height in 16..=20 {
        node.push_block(height, vec![]);
    }
    node.scheduler.tick().await.unwrap();
    assert_eq!(epochs.get_preimage().unwrap().epoch_number, Some(1));
    epochs.on_block_change();
    assert_eq!(epochs.get_preimage().unwrap().epoch_number, Some(2));
}

struct ThrowingPlugin;

#[async_trait::async_trait]
impl Plugin for ThrowingPlugin {
    fn name(&self) -> &str {
        "throws"
    }

    fn permissions(&self) -> HashSet<String> {
        ["blocks.onChange".to_string()].into_iter().collect()
    }

    async fn handle(&self, _event: &HookEvent) -> Result<Option<bool>, PluginError> {
        Err(PluginError("always fails".into()))
    }
}

/// A plugin failing a parallel block hook neither stalls the indexer nor
/// starves the other plugins.
#[tokio::test]
async fn failing_block_plugin_does_not_stall_indexing() {
    let node = TestNode::new().await;
    node.hooks.register(Arc::new(ThrowingPlugin)).await;

    for height in 1..=3 {
        node.push_block(height, vec![]);
    }
    node.scheduler.tick().await.unwrap();

    assert_eq!(node.storage.max_block_height().unwrap(), Some(3));
    let blocks: Vec<String> = node
        .events
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("block:"))
        .collect();
    assert_eq!(blocks, vec!["block:1", "block:2", "block:3"]);
}

/// Checksum lookups resolve through the dedicated index and the API DTO
/// carries hex encodings.
#[tokio::test]
async fn api_block_lookup_by_checksum() {
    let node = TestNode::new().await;
    for height in 1..=2 {
        node.push_block(height, vec![]);
    }
    node.scheduler.tick().await.unwrap();

    let header = node.storage.get_block_header(2).unwrap().unwrap();
    let blocks = BlockQueryService::new(node.storage.clone());
    let by_checksum = blocks
        .get_block_by_checksum(&encoding::to_hex(&header.checksum_root), false)
        .unwrap();
    assert_eq!(by_checksum.height, 2);
    assert_eq!(by_checksum.hash, encoding::to_hex(&header.hash));
    // Six checksum proofs, one per committed input.
    assert_eq!(by_checksum.checksum_proofs.len(), 6);
}
