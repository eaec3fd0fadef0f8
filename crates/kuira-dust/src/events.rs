//! Dust event stream: the three event kinds and their length-prefixed
//! binary framing.
//!
//! The indexer's dust query returns a concatenation of records, each a
//! little-endian u32 byte length followed by the bincode-encoded event.
//! `replay` consumes exactly this layout.

use kuira_types::DustError;
use serde::{Deserialize, Serialize};

/// Upper bound on a single encoded event record.
const MAX_EVENT_BYTES: u32 = 1 << 20;

/// A dust UTXO as it appears on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedDustOutput {
    /// Dust value at creation, Specks.
    pub initial_value: u128,
    /// Owner's dust public key.
    pub owner: [u8; 32],
    /// Nonce of this dust UTXO.
    pub nonce: [u8; 32],
    /// Spend sequence number.
    pub seq: u32,
    /// Creation time, ms.
    pub ctime: u64,
    /// Nonce of the backing Night UTXO.
    pub backing_night: [u8; 32],
    /// Commitment tree index.
    pub mt_index: u64,
}

/// Generation metadata tied to the backing Night UTXO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustGenerationInfo {
    /// Hash of the backing Night UTXO.
    pub night_utxo_hash: [u8; 32],
    /// Value of the backing Night UTXO, smallest Night units.
    pub value: u128,
    /// Owner's dust public key.
    pub owner: [u8; 32],
    /// Initial nonce.
    pub nonce: [u8; 32],
    /// Creation time, ms.
    pub ctime: u64,
    /// Decay boundary: generation stops and decay starts here, ms.
    pub dtime: u64,
}

/// One record of the replayable dust stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DustEvent {
    /// A dust UTXO came into existence.
    InitialUtxo {
        output: QualifiedDustOutput,
        generation: DustGenerationInfo,
        generation_index: u64,
        block_time: u64,
    },
    /// A dust spend confirmed on chain. May be another user's: the
    /// accumulator advances either way.
    SpendProcessed {
        commitment: [u8; 32],
        commitment_index: u64,
        nullifier: [u8; 32],
        v_fee: u128,
        declared_time: u64,
    },
    /// The decay boundary of a generation moved (its backing Night was
    /// spent).
    GenerationDtimeUpdate {
        night_utxo_hash: [u8; 32],
        dtime: u64,
        generation_index: u64,
        block_time: u64,
    },
}

impl DustEvent {
    /// The chain time this event carries.
    pub fn time(&self) -> u64 {
        match self {
            DustEvent::InitialUtxo { block_time, .. } => *block_time,
            DustEvent::SpendProcessed { declared_time, .. } => *declared_time,
            DustEvent::GenerationDtimeUpdate { block_time, .. } => *block_time,
        }
    }
}

/// Encode events into the length-prefixed stream layout.
pub fn encode_events(events: &[DustEvent]) -> Result<Vec<u8>, DustError> {
    let mut out = Vec::new();
    for event in events {
        let payload = bincode::serialize(event)
            .map_err(|e| DustError::InvalidEvents(format!("encode: {e}")))?;
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

/// Decode a length-prefixed event stream.
pub fn decode_events(mut bytes: &[u8]) -> Result<Vec<DustEvent>, DustError> {
    let mut events = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            return Err(DustError::InvalidEvents("truncated length prefix".into()));
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if len > MAX_EVENT_BYTES {
            return Err(DustError::InvalidEvents(format!("record length {len} too large")));
        }
        let len = len as usize;
        let rest = &bytes[4..];
        if rest.len() < len {
            return Err(DustError::InvalidEvents(format!(
                "truncated record: need {len} bytes, have {}",
                rest.len()
            )));
        }
        let event: DustEvent = bincode::deserialize(&rest[..len])
            .map_err(|e| DustError::InvalidEvents(format!("decode: {e}")))?;
        events.push(event);
        bytes = &rest[len..];
    }
    Ok(events)
}
