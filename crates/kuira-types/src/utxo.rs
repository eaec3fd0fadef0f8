//! Unshielded UTXO rows and derived balance views.

use serde::{Deserialize, Serialize};

use crate::{IntentHash, Signature, TokenType};

/// Unique identifier of a UTXO: the intent that created it and the output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoId {
    pub intent_hash: IntentHash,
    pub output_index: u32,
}

/// Lifecycle state of a stored UTXO.
///
/// Legal transitions: Available→Pending (reservation), Pending→Available
/// (release), Pending→Spent (confirmation), Available→Spent (spend observed
/// from another device holding the same keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoState {
    Available,
    Pending,
    Spent,
}

/// A stored unshielded coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: UtxoId,
    /// Bech32m string form of the owner address.
    pub owner_address: String,
    /// X-only public key the output is locked to.
    pub owner_public_key: [u8; 32],
    pub value: u128,
    pub token_type: TokenType,
    pub state: UtxoState,
    /// Block time the creating transaction confirmed, ms.
    pub created_at: u64,
    pub spent_at: Option<u64>,
}

/// Per-token balance view derived from the store. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_type: TokenType,
    /// Sum of Available UTXOs of this token.
    pub available: u128,
    /// Sum of Pending UTXOs of this token.
    pub pending: u128,
    pub utxo_count: usize,
}

/// A concrete UTXO being consumed as a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSpend {
    pub intent_hash: IntentHash,
    pub output_index: u32,
    pub value: u128,
    pub owner_public_key: [u8; 32],
    /// Attached by the signing step; `None` until then.
    pub signature: Option<Signature>,
}

impl UtxoSpend {
    /// Build an unsigned spend mirroring a stored UTXO.
    pub fn from_utxo(utxo: &Utxo) -> Self {
        Self {
            intent_hash: utxo.id.intent_hash,
            output_index: utxo.id.output_index,
            value: utxo.value,
            owner_public_key: utxo.owner_public_key,
            signature: None,
        }
    }

    pub fn id(&self) -> UtxoId {
        UtxoId {
            intent_hash: self.intent_hash,
            output_index: self.output_index,
        }
    }
}

/// A fresh output created by a transaction. `value` must be positive; the
/// assembler never emits zero-value outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutput {
    pub value: u128,
    /// Raw 32-byte address payload (decoded from the bech32m form).
    pub owner_address: [u8; 32],
    pub token_type: TokenType,
}
