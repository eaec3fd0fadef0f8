//! Canonical binary encoding of transaction intents.
//!
//! The encoder owns ordering: inputs and outputs are sorted into canonical
//! order before any byte is written, so equal intents always produce equal
//! bytes. The signer must attach signatures in this post-sort input order;
//! `signing_message` exposes the per-input message over the sorted, unsigned
//! encoding.

use sha2::{Digest, Sha256};

use kuira_types::{Intent, Result, UnshieldedOffer, UtxoOutput, UtxoSpend, WalletError};

pub mod compact;
pub mod envelope;

use compact::write_compact;

const ENCODING_VERSION: u8 = 1;
const TX_HASH_TAG: &[u8] = b"kuira/transaction-hash";

/// Canonical input order: by creating intent hash, then output index.
pub fn sort_inputs(inputs: &mut [UtxoSpend]) {
    inputs.sort_by(|a, b| {
        a.intent_hash
            .cmp(&b.intent_hash)
            .then(a.output_index.cmp(&b.output_index))
    });
}

/// Canonical output order: by token type, then owner, then value.
pub fn sort_outputs(outputs: &mut [UtxoOutput]) {
    outputs.sort_by(|a, b| {
        a.token_type
            .cmp(&b.token_type)
            .then(a.owner_address.cmp(&b.owner_address))
            .then(a.value.cmp(&b.value))
    });
}

/// Return the intent with its guaranteed offer in canonical order.
///
/// Signatures are not reordered: they are attached after sorting and are
/// expected to already be in post-sort input order.
pub fn canonicalize(intent: &Intent) -> Intent {
    let mut canonical = intent.clone();
    if let Some(offer) = canonical.guaranteed_offer.as_mut() {
        sort_inputs(&mut offer.inputs);
        sort_outputs(&mut offer.outputs);
    }
    canonical
}

fn check_offer(offer: &UnshieldedOffer) -> Result<()> {
    if !offer.signatures.is_empty() && offer.signatures.len() != offer.inputs.len() {
        return Err(WalletError::Encoding(format!(
            "{} signatures for {} inputs",
            offer.signatures.len(),
            offer.inputs.len()
        )));
    }
    if let Some(output) = offer.outputs.iter().find(|o| o.value == 0) {
        return Err(WalletError::Encoding(format!(
            "zero-value output for token {}",
            kuira_types::to_hex(&output.token_type)
        )));
    }
    Ok(())
}

fn write_offer(out: &mut Vec<u8>, offer: &UnshieldedOffer, with_signatures: bool) {
    write_compact(out, offer.inputs.len() as u128);
    for input in &offer.inputs {
        out.extend_from_slice(&input.intent_hash);
        write_compact(out, input.output_index as u128);
        write_compact(out, input.value);
        out.extend_from_slice(&input.owner_public_key);
    }

    write_compact(out, offer.outputs.len() as u128);
    for output in &offer.outputs {
        write_compact(out, output.value);
        out.extend_from_slice(&output.owner_address);
        out.extend_from_slice(&output.token_type);
    }

    if with_signatures {
        write_compact(out, offer.signatures.len() as u128);
        for signature in &offer.signatures {
            out.extend_from_slice(&signature.0);
        }
    } else {
        write_compact(out, 0);
    }
}

fn encode_canonical(intent: &Intent, with_signatures: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.push(ENCODING_VERSION);
    write_compact(&mut out, intent.ttl_ms as u128);

    match &intent.guaranteed_offer {
        Some(offer) => {
            check_offer(offer)?;
            out.push(1);
            write_offer(&mut out, offer, with_signatures);
        }
        None => out.push(0),
    }

    match &intent.dust_actions {
        Some(actions) => {
            out.push(1);
            write_compact(&mut out, actions.spends.len() as u128);
            for spend in &actions.spends {
                out.extend_from_slice(&spend.old_nullifier);
                out.extend_from_slice(&spend.new_commitment);
                write_compact(&mut out, spend.v_fee);
                write_compact(&mut out, spend.proof_preimage.len() as u128);
                out.extend_from_slice(&spend.proof_preimage);
            }
            write_compact(&mut out, actions.registrations.len() as u128);
            for registration in &actions.registrations {
                out.extend_from_slice(&registration.night_public_key);
                out.extend_from_slice(&registration.dust_address);
            }
        }
        None => out.push(0),
    }

    Ok(out)
}

/// Canonical bytes of an intent, signatures included when present.
pub fn encode_intent(intent: &Intent) -> Result<Vec<u8>> {
    encode_canonical(&canonicalize(intent), true)
}

/// Canonical bytes with the given dust actions attached. Second pass of the
/// fee flow.
pub fn encode_intent_with_dust(
    intent: &Intent,
    dust_actions: kuira_types::DustActions,
) -> Result<Vec<u8>> {
    let mut with_dust = intent.clone();
    with_dust.dust_actions = Some(dust_actions);
    encode_intent(&with_dust)
}

/// The message the signer commits to for input `input_index` of the
/// canonical intent: the unsigned canonical encoding bound to the post-sort
/// input position.
pub fn signing_message(intent: &Intent, input_index: usize) -> Result<Vec<u8>> {
    let canonical = canonicalize(intent);
    let offer = canonical
        .guaranteed_offer
        .as_ref()
        .ok_or_else(|| WalletError::Encoding("intent has no guaranteed offer".into()))?;
    if input_index >= offer.inputs.len() {
        return Err(WalletError::Encoding(format!(
            "input index {input_index} out of range ({} inputs)",
            offer.inputs.len()
        )));
    }

    let mut message = encode_canonical(&canonical, false)?;
    message.extend_from_slice(&(input_index as u32).to_be_bytes());
    Ok(message)
}

/// Transaction hash of canonical encoded bytes, as the node reports it.
pub fn transaction_hash(encoded: &[u8]) -> [u8; 32] {
    let tag_hash: [u8; 32] = Sha256::digest(TX_HASH_TAG).into();
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(encoded);
    hasher.finalize().into()
}
