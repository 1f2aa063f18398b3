//! # Transaction Ordering
//!
//! Partitions executable transactions into independence groups and sorts
//! the groups deterministically.

use shared_types::{ContractAddress, StoragePointer, Transaction};
use std::collections::BTreeSet;
use tracing::debug;

/// The (contract, pointer) footprint a transaction declares.
///
/// A transaction without a declared access list touches its whole target
/// contract; two such transactions on the same contract always conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchSet {
    /// Contracts touched without slot granularity.
    pub whole_contracts: BTreeSet<ContractAddress>,
    /// Slot-granular touches.
    pub slots: BTreeSet<(ContractAddress, StoragePointer)>,
}

impl TouchSet {
    /// Footprint of a transaction, derived from its payload.
    #[must_use]
    pub fn of(tx: &Transaction) -> Self {
        let mut set = Self::default();
        if let Some(interaction) = &tx.interaction {
            set.whole_contracts.insert(interaction.contract.clone());
        }
        if let Some(deployment) = &tx.deployment {
            // Deployments conflict on the deployer key: two deployments
            // from one key may race for the same derived address.
            set.whole_contracts.insert(ContractAddress::new(format!(
                "deployer:{}",
                shared_types::encoding::to_hex(&deployment.deployer_public_key)
            )));
        }
        set
    }

    /// Whether two footprints overlap.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        if self
            .whole_contracts
            .intersection(&other.whole_contracts)
            .next()
            .is_some()
        {
            return true;
        }
        if other
            .slots
            .iter()
            .any(|(contract, _)| self.whole_contracts.contains(contract))
        {
            return true;
        }
        if self
            .slots
            .iter()
            .any(|(contract, _)| other.whole_contracts.contains(contract))
        {
            return true;
        }
        self.slots.intersection(&other.slots).next().is_some()
    }
}

/// Union-find over transaction indices.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, index: usize) -> usize {
        if self.parent[index] != index {
            let root = self.find(self.parent[index]);
            self.parent[index] = root;
        }
        self.parent[index]
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_b] = root_a;
        }
    }
}

/// Partition and order executable transactions.
///
/// Returns groups of indices into `transactions`. Group order is the
/// deterministic rank order; index order within a group is base-chain
/// insertion order.
#[must_use]
pub fn order_transactions(transactions: &[Transaction], gas_penalty_factor: u64) -> Vec<Vec<usize>> {
    let executable: Vec<usize> = transactions
        .iter()
        .enumerate()
        .filter(|(_, tx)| tx.is_executable())
        .map(|(index, _)| index)
        .collect();
    if executable.is_empty() {
        return Vec::new();
    }

    let footprints: Vec<TouchSet> = executable
        .iter()
        .map(|&index| TouchSet::of(&transactions[index]))
        .collect();

    let mut sets = DisjointSets::new(executable.len());
    for i in 0..executable.len() {
        for j in (i + 1)..executable.len() {
            if footprints[i].conflicts_with(&footprints[j]) {
                sets.union(i, j);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut roots: Vec<usize> = Vec::new();
    for (position, &index) in executable.iter().enumerate() {
        let root = sets.find(position);
        match roots.iter().position(|&r| r == root) {
            Some(group) => groups[group].push(index),
            None => {
                roots.push(root);
                groups.push(vec![index]);
            }
        }
    }

    // Rank: cheaper gas burn and higher priority fee win the front.
    groups.sort_by(|a, b| {
        let rank_a = group_rank(transactions, a, gas_penalty_factor);
        let rank_b = group_rank(transactions, b, gas_penalty_factor);
        rank_a
            .cmp(&rank_b)
            .then_with(|| group_tiebreak(transactions, a).cmp(&group_tiebreak(transactions, b)))
    });

    debug!(
        executable = executable.len(),
        groups = groups.len(),
        "transactions partitioned"
    );
    groups
}

fn group_rank(transactions: &[Transaction], group: &[usize], gas_penalty_factor: u64) -> i128 {
    let gas_fees: i128 = group
        .iter()
        .map(|&index| i128::from(transactions[index].gas_sat_fee()))
        .sum();
    let priority: i128 = group
        .iter()
        .map(|&index| i128::from(transactions[index].priority_fee()))
        .sum();
    gas_fees * i128::from(gas_penalty_factor) - priority
}

fn group_tiebreak(transactions: &[Transaction], group: &[usize]) -> Vec<u8> {
    let mut concatenated = Vec::with_capacity(group.len() * 32);
    for &index in group {
        concatenated.extend_from_slice(&transactions[index].hash);
    }
    concatenated
}
