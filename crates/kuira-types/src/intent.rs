//! Transaction intents: the unshielded offer, dust actions and the
//! submission outcome.

use serde::{Deserialize, Serialize};

use crate::{UtxoOutput, UtxoSpend};

/// 64-byte BIP-340 Schnorr signature, hex-encoded in serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))?;
        Ok(Signature(arr))
    }
}

/// The guaranteed unshielded segment of an intent.
///
/// `signatures` is empty until the signing step runs; afterwards it holds
/// exactly one signature per input, in the encoder's canonical input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnshieldedOffer {
    pub inputs: Vec<UtxoSpend>,
    pub outputs: Vec<UtxoOutput>,
    pub signatures: Vec<Signature>,
}

impl UnshieldedOffer {
    /// True once every input carries a signature.
    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.signatures.len() == self.inputs.len()
    }
}

/// A dust spend action produced by the dust state engine. Not constructible
/// by callers; the engine is the only source of valid nullifier/commitment
/// pairs and proof preimages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustSpend {
    pub old_nullifier: [u8; 32],
    pub new_commitment: [u8; 32],
    /// Fee covered by this spend, in Specks.
    pub v_fee: u128,
    /// Witness bytes for the zero-knowledge spend proof.
    pub proof_preimage: Vec<u8>,
}

/// Registration of a fresh Night UTXO as dust backing. Carried on the wire
/// shape but never produced by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustRegistration {
    pub night_public_key: [u8; 32],
    pub dust_address: [u8; 32],
}

/// Fee payment attached to an intent when fees are due.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DustActions {
    pub spends: Vec<DustSpend>,
    pub registrations: Vec<DustRegistration>,
}

impl DustActions {
    pub fn total_fee(&self) -> u128 {
        self.spends.iter().map(|s| s.v_fee).sum()
    }
}

/// A transaction intent. Only the guaranteed segment is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub guaranteed_offer: Option<UnshieldedOffer>,
    pub dust_actions: Option<DustActions>,
    /// Absolute expiry, ms since epoch. Must be in the future at construction.
    pub ttl_ms: u64,
}

/// Outcome of `submit_and_wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// Confirmed in a block; the guaranteed segment succeeded.
    Success {
        tx_hash: [u8; 32],
        block_height: Option<u64>,
    },
    /// Confirmed but failed; reservations have been released.
    Failed { reason: String },
    /// Not observed within the confirmation window; reservations kept.
    Pending { tx_hash: [u8; 32] },
}
