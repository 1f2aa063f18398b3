//! # State Slot Repository
//!
//! Height-versioned (contract, pointer) → value cells. Each write lands
//! under `sha256(contract) ‖ pointer ‖ height`, so a historical read is
//! "the greatest height ≤ `at_height` within the slot prefix". A
//! height-keyed index supports reorg deletion.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use shared_types::{ContractAddress, SlotValue, StoragePointer};

/// One slot write queued for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    pub contract: ContractAddress,
    pub pointer: StoragePointer,
    pub value: SlotValue,
    pub height: u64,
}

impl StorageEngine {
    /// Persist a batch of slot writes.
    pub fn set_slot_batch(
        &self,
        writes: &[SlotWrite],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(writes.len() * 2);
        for write in writes {
            let slot_key = keys::state_slot_key(&write.contract, &write.pointer, write.height);
            ops.push(BatchOperation::put(
                Collection::State,
                slot_key.clone(),
                write.value.to_vec(),
            ));
            ops.push(BatchOperation::put(
                Collection::StateByHeight,
                keys::state_by_height_key(write.height, &slot_key),
                Vec::new(),
            ));
        }
        self.apply(ctx, ops)
    }

    /// Value of a slot as of `at_height`: the last write at or below it.
    pub fn get_slot(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
        at_height: u64,
    ) -> Result<Option<SlotValue>, StorageError> {
        let prefix = keys::state_slot_prefix(contract, pointer);
        let entries = self.backend().scan_prefix(Collection::State, &prefix)?;

        let mut best: Option<Vec<u8>> = None;
        for (key, value) in entries {
            let Some(height) = keys::decode_height(&key[prefix.len()..]) else {
                continue;
            };
            if height <= at_height {
                best = Some(value);
            } else {
                break;
            }
        }

        match best {
            Some(bytes) => {
                let value: SlotValue = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corruption {
                        collection: Collection::State.name().to_string(),
                        detail: "slot value is not 32 bytes".into(),
                    }
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Delete every slot version written at or above `from_height`.
    pub fn delete_state_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self.backend().scan_range(
            Collection::StateByHeight,
            &keys::height_key(from_height),
            &[0xFF; 9],
        )?;
        let mut ops = Vec::with_capacity(entries.len() * 2);
        for (key, _) in entries {
            let slot_key = key[8..].to_vec();
            ops.push(BatchOperation::delete(Collection::State, slot_key));
            ops.push(BatchOperation::delete(Collection::StateByHeight, key));
        }
        self.apply(ctx, ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use std::sync::Arc;

    fn engine() -> StorageEngine {
        StorageEngine::new(Arc::new(MemoryBackend::new()))
    }

    fn write(contract: &str, pointer: u8, value: u8, height: u64) -> SlotWrite {
        let mut p = [0u8; 32];
        p[0] = pointer;
        let mut v = [0u8; 32];
        v[31] = value;
        SlotWrite {
            contract: ContractAddress::new(format!("oc1{contract}")),
            pointer: p,
            value: v,
            height,
        }
    }

    #[test]
    fn test_read_sees_last_write_at_or_below_height() {
        let engine = engine();
        engine
            .set_slot_batch(
                &[
                    write("aa", 1, 10, 100),
                    write("aa", 1, 20, 105),
                    write("aa", 1, 30, 110),
                ],
                None,
            )
            .unwrap();

        let contract = ContractAddress::new("oc1aa");
        let pointer = {
            let mut p = [0u8; 32];
            p[0] = 1;
            p
        };

        assert!(engine.get_slot(&contract, &pointer, 99).unwrap().is_none());
        assert_eq!(engine.get_slot(&contract, &pointer, 100).unwrap().unwrap()[31], 10);
        assert_eq!(engine.get_slot(&contract, &pointer, 107).unwrap().unwrap()[31], 20);
        assert_eq!(engine.get_slot(&contract, &pointer, 500).unwrap().unwrap()[31], 30);
    }

    #[test]
    fn test_slots_are_isolated_per_pointer_and_contract() {
        let engine = engine();
        engine
            .set_slot_batch(&[write("aa", 1, 10, 100), write("bb", 1, 99, 100)], None)
            .unwrap();

        let contract = ContractAddress::new("oc1aa");
        let mut other_pointer = [0u8; 32];
        other_pointer[0] = 2;
        assert!(engine.get_slot(&contract, &other_pointer, 200).unwrap().is_none());

        let mut pointer = [0u8; 32];
        pointer[0] = 1;
        assert_eq!(engine.get_slot(&contract, &pointer, 200).unwrap().unwrap()[31], 10);
    }

    #[test]
    fn test_reorg_delete_restores_previous_version() {
        let engine = engine();
        engine
            .set_slot_batch(&[write("aa", 1, 10, 100), write("aa", 1, 20, 105)], None)
            .unwrap();
        engine.delete_state_from(105, None).unwrap();

        let contract = ContractAddress::new("oc1aa");
        let mut pointer = [0u8; 32];
        pointer[0] = 1;
        assert_eq!(engine.get_slot(&contract, &pointer, 200).unwrap().unwrap()[31], 10);
    }
}
