//! Transaction assembly, signing and fee attachment.
//!
//! A transfer goes through four steps, each its own call so the reservation
//! window stays short:
//!   1. `build_transfer` — reserve inputs, lay out outputs and change
//!   2. `sign_intent` — attach one signature per input in canonical order
//!   3. `attach_fee` — two-pass encode, dust selection, dust spend actions
//!   4. `Submitter::submit_and_wait` — node RPC plus indexer confirmation

use kuira_codec::{canonicalize, encode_intent, encode_intent_with_dust, signing_message};
use kuira_crypto::{schnorr, DerivedKey};
use kuira_dust::DustLocalState;
use kuira_store::UtxoStore;
use kuira_types::{
    now_ms, DustActions, Intent, NetworkId, Result, TokenType, UnshieldedOffer, UtxoOutput,
    UtxoSpend, WalletError,
};
use tracing::debug;

pub mod node_client;
pub mod submitter;

pub use node_client::{HttpNodeClient, NodeClient};
pub use submitter::Submitter;

/// Default intent time-to-live: 30 minutes.
pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;

/// Reserve inputs and assemble an unsigned transfer intent.
///
/// Outputs are the recipient output plus change back to the sender; the
/// change output is omitted when it would be zero. Validation covers only
/// caller-observable conditions: a positive amount, non-blank addresses, a
/// recipient that decodes on this network. The rest is correct by
/// construction.
pub async fn build_transfer(
    store: &UtxoStore,
    network: NetworkId,
    sender: &str,
    recipient: &str,
    amount: u128,
    token_type: &TokenType,
    ttl_ms: Option<u64>,
) -> Result<Intent> {
    if amount == 0 {
        return Err(WalletError::AmountNonPositive);
    }
    if sender.trim().is_empty() || recipient.trim().is_empty() {
        return Err(WalletError::BlankAddress);
    }
    let recipient_raw = kuira_crypto::address::decode_for_network(recipient, network)?;
    let sender_raw = kuira_crypto::address::decode_for_network(sender, network)?;

    let rows = store.select_and_lock(sender, token_type, amount).await?;
    let total: u128 = rows.iter().map(|r| r.value).sum();
    let change = total - amount;

    let mut outputs = vec![UtxoOutput {
        value: amount,
        owner_address: recipient_raw,
        token_type: *token_type,
    }];
    if change > 0 {
        outputs.push(UtxoOutput {
            value: change,
            owner_address: sender_raw,
            token_type: *token_type,
        });
    }

    let inputs: Vec<UtxoSpend> = rows.iter().map(UtxoSpend::from_utxo).collect();
    debug!(inputs = inputs.len(), amount, change, "transfer assembled");

    Ok(Intent {
        guaranteed_offer: Some(UnshieldedOffer {
            inputs,
            outputs,
            signatures: Vec::new(),
        }),
        dust_actions: None,
        ttl_ms: ttl_ms.unwrap_or_else(|| now_ms() + DEFAULT_TTL_MS),
    })
}

/// Sign every input of the guaranteed offer with `key`.
///
/// Returns the canonical intent with signatures attached in post-sort input
/// order, the order the encoder writes them in. The key must own every
/// input.
pub fn sign_intent(intent: &Intent, key: &DerivedKey) -> Result<Intent> {
    let mut canonical = canonicalize(intent);
    let input_count = {
        let offer = canonical
            .guaranteed_offer
            .as_ref()
            .ok_or_else(|| WalletError::Signing("intent has no guaranteed offer".into()))?;
        let public = key.public_key();
        if offer.inputs.iter().any(|i| i.owner_public_key != public) {
            return Err(WalletError::Signing(
                "signing key does not own every input".into(),
            ));
        }
        offer.inputs.len()
    };

    let mut signatures = Vec::with_capacity(input_count);
    for index in 0..input_count {
        let message = signing_message(&canonical, index)?;
        // The signer wipes the buffer it is given; sign each input with its
        // own copy of the scalar.
        let mut secret = *key.secret_bytes();
        let sig = schnorr::sign(&mut secret, &message)?;
        signatures.push(kuira_types::Signature(sig));
    }

    if let Some(offer) = canonical.guaranteed_offer.as_mut() {
        for (input, signature) in offer.inputs.iter_mut().zip(&signatures) {
            input.signature = Some(*signature);
        }
        offer.signatures = signatures;
    }
    Ok(canonical)
}

/// Two-pass fee attachment.
///
/// Pass one encodes the signed intent without dust actions; the fee is that
/// size times the specks-per-byte rate. Dust UTXOs are chosen smallest-first
/// and spent for exactly the fee, and pass two re-encodes with the actions
/// attached. The fee model excludes the dust proof bytes, so no third pass
/// is needed.
pub fn attach_fee(
    intent: &Intent,
    dust: &mut DustLocalState,
    dust_seed: &[u8; 32],
    specks_per_byte: u128,
    current_time_ms: u64,
) -> Result<(Vec<u8>, DustActions)> {
    let first_pass = encode_intent(intent)?;
    let fee = kuira_planner::fee_for_size(first_pass.len(), specks_per_byte);
    if fee == 0 {
        return Ok((first_pass, DustActions::default()));
    }

    let balances = dust.spendable_balances(current_time_ms);
    let selections = kuira_planner::select_dust(&balances, fee)?;

    let mut actions = DustActions::default();
    for selection in selections {
        let spend = dust.spend(dust_seed, selection.utxo_index, selection.amount, current_time_ms)?;
        actions.spends.push(spend);
    }
    debug!(fee, spends = actions.spends.len(), "dust fee attached");

    let encoded = encode_intent_with_dust(intent, actions.clone())?;
    Ok((encoded, actions))
}

#[cfg(test)]
mod tests;
