//! # Second-Layer Payload Extraction
//!
//! A base-chain transaction carries its second-layer payload in an
//! `OP_RETURN` output: a 4-byte envelope magic, a kind byte, and a
//! bincode-encoded payload. Transactions without a recognized envelope
//! stay `Generic`.

use shared_types::{DeploymentPayload, InteractionPayload, Transaction, TransactionType};
use tracing::trace;

/// Envelope magic preceding every second-layer payload.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"OPX\x01";

/// Kind byte for interaction payloads.
pub const KIND_INTERACTION: u8 = 0x01;
/// Kind byte for deployment payloads.
pub const KIND_DEPLOYMENT: u8 = 0x02;

/// Extract the envelope bytes from an `OP_RETURN` script, if present.
fn envelope_of(script: &[u8]) -> Option<&[u8]> {
    // OP_RETURN followed by a single push.
    if script.first() != Some(&0x6A) {
        return None;
    }
    let (data_start, data_len) = match script.get(1)? {
        // OP_PUSHDATA1
        0x4C => (3usize, *script.get(2)? as usize),
        // OP_PUSHDATA2
        0x4D => (
            4usize,
            usize::from(*script.get(2)?) | (usize::from(*script.get(3)?) << 8),
        ),
        // Direct push
        len @ 0x01..=0x4B => (2usize, *len as usize),
        _ => return None,
    };
    script.get(data_start..data_start + data_len)
}

/// Classify one transaction in place: fills `interaction` or
/// `deployment` and flips the kind when an envelope is recognized.
pub fn classify_transaction(tx: &mut Transaction) {
    if tx.kind == TransactionType::Coinbase {
        return;
    }
    for output in &tx.outputs {
        let Some(envelope) = envelope_of(&output.script_pub_key) else {
            continue;
        };
        if envelope.len() < 5 || envelope[..4] != ENVELOPE_MAGIC {
            continue;
        }
        match envelope[4] {
            KIND_INTERACTION => {
                if let Ok(payload) = bincode::deserialize::<InteractionPayload>(&envelope[5..]) {
                    trace!(contract = %payload.contract, "interaction envelope");
                    tx.interaction = Some(payload);
                    tx.kind = TransactionType::Interaction;
                    return;
                }
            }
            KIND_DEPLOYMENT => {
                if let Ok(payload) = bincode::deserialize::<DeploymentPayload>(&envelope[5..]) {
                    trace!("deployment envelope");
                    tx.deployment = Some(payload);
                    tx.kind = TransactionType::Deployment;
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Classify every transaction of a prefetched block.
pub fn classify_block(transactions: &mut [Transaction]) {
    for tx in transactions {
        classify_transaction(tx);
    }
}

/// Build an envelope script for a payload. Used by tests and tooling.
#[must_use]
pub fn build_envelope_script(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(5 + payload.len());
    data.extend_from_slice(&ENVELOPE_MAGIC);
    data.push(kind);
    data.extend_from_slice(payload);

    let mut script = vec![0x6A];
    if data.len() <= 0x4B {
        script.push(data.len() as u8);
    } else if data.len() <= 0xFF {
        script.push(0x4C);
        script.push(data.len() as u8);
    } else {
        script.push(0x4D);
        script.push((data.len() & 0xFF) as u8);
        script.push((data.len() >> 8) as u8);
    }
    script.extend_from_slice(&data);
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ContractAddress, TransactionOutput};

    fn base_tx() -> Transaction {
        Transaction {
            id: [1u8; 32],
            hash: [1u8; 32],
            kind: TransactionType::Generic,
            inputs: vec![],
            outputs: vec![],
            block_height: 10,
            index_in_block: 0,
            interaction: None,
            deployment: None,
            receipt: None,
        }
    }

    fn interaction_payload() -> InteractionPayload {
        InteractionPayload {
            contract: ContractAddress::new("oc1feedface"),
            calldata: vec![0x01, 0x02],
            gas_limit: 1_000_000,
            gas_sat_fee: 500,
            priority_fee: 10,
            from_public_key: vec![2u8; 33],
            preimage: None,
            reward: None,
        }
    }

    #[test]
    fn test_interaction_envelope_roundtrip() {
        let payload = interaction_payload();
        let script = build_envelope_script(
            KIND_INTERACTION,
            &bincode::serialize(&payload).unwrap(),
        );
        let mut tx = base_tx();
        tx.outputs.push(TransactionOutput {
            value: 0,
            script_pub_key: script,
            address: None,
        });

        classify_transaction(&mut tx);
        assert_eq!(tx.kind, TransactionType::Interaction);
        assert_eq!(tx.interaction, Some(payload));
    }

    #[test]
    fn test_large_envelope_uses_pushdata2() {
        let mut payload = interaction_payload();
        payload.calldata = vec![0xAB; 600];
        let script = build_envelope_script(
            KIND_INTERACTION,
            &bincode::serialize(&payload).unwrap(),
        );
        assert_eq!(script[1], 0x4D);

        let mut tx = base_tx();
        tx.outputs.push(TransactionOutput {
            value: 0,
            script_pub_key: script,
            address: None,
        });
        classify_transaction(&mut tx);
        assert_eq!(tx.kind, TransactionType::Interaction);
    }

    #[test]
    fn test_non_envelope_outputs_stay_generic() {
        let mut tx = base_tx();
        tx.outputs.push(TransactionOutput {
            value: 5_000,
            script_pub_key: vec![0x00, 0x14],
            address: None,
        });
        tx.outputs.push(TransactionOutput {
            value: 0,
            // OP_RETURN with unrelated data.
            script_pub_key: vec![0x6A, 0x03, 0x01, 0x02, 0x03],
            address: None,
        });
        classify_transaction(&mut tx);
        assert_eq!(tx.kind, TransactionType::Generic);
        assert!(tx.interaction.is_none());
    }

    #[test]
    fn test_coinbase_is_never_classified() {
        let payload = interaction_payload();
        let script = build_envelope_script(
            KIND_INTERACTION,
            &bincode::serialize(&payload).unwrap(),
        );
        let mut tx = base_tx();
        tx.kind = TransactionType::Coinbase;
        tx.outputs.push(TransactionOutput {
            value: 0,
            script_pub_key: script,
            address: None,
        });
        classify_transaction(&mut tx);
        assert_eq!(tx.kind, TransactionType::Coinbase);
    }
}
