//! The dust local state: accumulator, owned UTXOs, pending spends.

use std::collections::HashSet;

use kuira_merkle::MerkleTree;
use kuira_types::{DustError, DustParameters, DustSpend, Result as WalletResult, WalletError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroize;

use crate::events::{decode_events, DustEvent, DustGenerationInfo, QualifiedDustOutput};

const TAG_PUBLIC: &[u8] = b"kuira/dust/public-key";
const TAG_NULLIFIER: &[u8] = b"kuira/dust/nullifier";
const TAG_COMMITMENT: &[u8] = b"kuira/dust/commitment";
const TAG_NONCE: &[u8] = b"kuira/dust/nonce-evolution";
const TAG_PROOF: &[u8] = b"kuira/dust/spend-proof";

fn tagged(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let tag_hash: [u8; 32] = Sha256::digest(tag).into();
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The dust public key for a 32-byte dust-role seed. This is the `owner`
/// field dust events carry.
pub fn dust_public_key(seed: &[u8; 32]) -> [u8; 32] {
    tagged(TAG_PUBLIC, &[seed])
}

fn commitment_of(output: &QualifiedDustOutput) -> [u8; 32] {
    tagged(
        TAG_COMMITMENT,
        &[
            &output.owner,
            &output.nonce,
            &output.seq.to_be_bytes(),
            &output.initial_value.to_be_bytes(),
        ],
    )
}

/// Read-only view of one owned dust UTXO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DustUtxoInfo {
    pub initial_value: u128,
    pub ctime: u64,
    pub dtime: u64,
    /// Value of the backing Night UTXO.
    pub backing_value: u128,
    /// Specks already spent (confirmed or pending) from this UTXO.
    pub spent_amount: u128,
    pub pending_spends: usize,
    pub mt_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnedDust {
    output: QualifiedDustOutput,
    generation: DustGenerationInfo,
    generation_index: u64,
    spent_amount: u128,
    /// Nullifiers of spends not yet confirmed on chain.
    pending: Vec<[u8; 32]>,
}

/// Locally replicated dust state.
///
/// `close()` must be called when the owner is done with the handle; it wipes
/// nonce material and empties the state. Calling it twice is fine.
#[derive(Debug, Serialize, Deserialize)]
pub struct DustLocalState {
    params: DustParameters,
    backend_version: String,
    commitments: MerkleTree,
    owned: Vec<OwnedDust>,
    pending_nullifiers: HashSet<[u8; 32]>,
    last_processed_ms: u64,
    closed: bool,
}

impl DustLocalState {
    /// Fresh state with the network's dust parameters.
    pub fn new(params: DustParameters, backend_version: &str) -> Self {
        Self {
            params,
            backend_version: backend_version.to_string(),
            commitments: MerkleTree::new(None),
            owned: Vec::new(),
            pending_nullifiers: HashSet::new(),
            last_processed_ms: 0,
            closed: false,
        }
    }

    /// Snapshot for persistence.
    pub fn serialize(&self) -> WalletResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| WalletError::Storage(e.to_string()))
    }

    /// Restore a snapshot, refusing one written by a different pinned
    /// backend version.
    pub fn deserialize(bytes: &[u8], pinned_backend: &str) -> WalletResult<Self> {
        let mut state: DustLocalState =
            bincode::deserialize(bytes).map_err(|e| WalletError::Storage(e.to_string()))?;
        if state.backend_version != pinned_backend {
            return Err(WalletError::DerivationMismatch {
                pinned: pinned_backend.to_string(),
                found: state.backend_version.clone(),
            });
        }
        state.commitments.rehydrate();
        Ok(state)
    }

    fn ensure_open(&self) -> Result<(), DustError> {
        if self.closed {
            return Err(DustError::InvalidEvents("state is closed".into()));
        }
        Ok(())
    }

    fn check_seed(seed: &[u8; 32]) -> Result<[u8; 32], DustError> {
        if seed.iter().all(|&b| b == 0) {
            return Err(DustError::InvalidSeed);
        }
        Ok(dust_public_key(seed))
    }

    pub fn last_processed_ms(&self) -> u64 {
        self.last_processed_ms
    }

    pub fn commitment_root(&self) -> [u8; 32] {
        self.commitments.root()
    }

    /// Fold an event stream into the state. Events must be in chain order;
    /// a record older than the last processed time is rejected.
    pub fn replay(&mut self, seed: &[u8; 32], events_bytes: &[u8]) -> Result<(), DustError> {
        self.ensure_open()?;
        let pk = Self::check_seed(seed)?;

        for event in decode_events(events_bytes)? {
            if event.time() < self.last_processed_ms {
                return Err(DustError::InvalidEvents(format!(
                    "out of order: event time {} before last processed {}",
                    event.time(),
                    self.last_processed_ms
                )));
            }
            let time = event.time();
            match event {
                DustEvent::InitialUtxo { output, generation, generation_index, .. } => {
                    self.push_commitment(output.mt_index, commitment_of(&output))?;
                    if output.owner == pk {
                        debug!(mt_index = output.mt_index, "adding owned dust utxo");
                        self.owned.push(OwnedDust {
                            output,
                            generation,
                            generation_index,
                            spent_amount: 0,
                            pending: Vec::new(),
                        });
                    }
                }
                DustEvent::SpendProcessed { commitment, commitment_index, nullifier, .. } => {
                    self.push_commitment(commitment_index, commitment)?;
                    if self.pending_nullifiers.remove(&nullifier) {
                        // One of ours confirmed: graduate it and track the
                        // replacement commitment.
                        for od in &mut self.owned {
                            if od.pending.iter().any(|n| n == &nullifier) {
                                od.pending.retain(|n| n != &nullifier);
                                od.output.mt_index = commitment_index;
                            }
                        }
                        debug!("pending dust spend confirmed");
                    }
                }
                DustEvent::GenerationDtimeUpdate { night_utxo_hash, dtime, .. } => {
                    for od in &mut self.owned {
                        if od.generation.night_utxo_hash == night_utxo_hash {
                            od.generation.dtime = dtime;
                        }
                    }
                }
            }
            self.last_processed_ms = time;
        }
        Ok(())
    }

    fn push_commitment(&mut self, index: u64, commitment: [u8; 32]) -> Result<(), DustError> {
        let expected = self.commitments.leaf_count() as u64;
        if index != expected {
            return Err(DustError::InvalidEvents(format!(
                "non-contiguous commitment index: expected {expected}, got {index}"
            )));
        }
        self.commitments.push(commitment);
        Ok(())
    }

    /// Dust generated by one UTXO at `t_ms`, before subtracting spends.
    ///
    /// Grows linearly from ctime at `rate × night_value` Specks per second,
    /// capped at `night_value × ratio`; decays at the same rate after dtime.
    fn generated_value(&self, od: &OwnedDust, t_ms: u64) -> u128 {
        let gen = &od.generation;
        let night = gen.value;
        let cap = night.saturating_mul(self.params.night_dust_ratio as u128);
        let rate = night.saturating_mul(self.params.generation_decay_rate as u128);

        if t_ms <= gen.ctime {
            return od.output.initial_value.min(cap);
        }

        let grow_secs = (t_ms.min(gen.dtime).saturating_sub(gen.ctime) / 1000) as u128;
        let grown = od
            .output
            .initial_value
            .saturating_add(rate.saturating_mul(grow_secs))
            .min(cap);

        if t_ms <= gen.dtime {
            grown
        } else {
            let decay_secs = ((t_ms - gen.dtime) / 1000) as u128;
            grown.saturating_sub(rate.saturating_mul(decay_secs))
        }
    }

    fn spendable_at(&self, od: &OwnedDust, t_ms: u64) -> u128 {
        self.generated_value(od, t_ms).saturating_sub(od.spent_amount)
    }

    /// Total spendable dust at `at_time_ms`, Specks.
    pub fn balance(&self, at_time_ms: u64) -> u128 {
        self.owned
            .iter()
            .map(|od| self.spendable_at(od, at_time_ms))
            .sum()
    }

    pub fn utxo_count(&self) -> usize {
        self.owned.len()
    }

    pub fn utxo_at(&self, index: usize) -> Result<DustUtxoInfo, DustError> {
        let od = self.owned.get(index).ok_or(DustError::OutOfBoundsUtxo {
            index,
            count: self.owned.len(),
        })?;
        Ok(DustUtxoInfo {
            initial_value: od.output.initial_value,
            ctime: od.generation.ctime,
            dtime: od.generation.dtime,
            backing_value: od.generation.value,
            spent_amount: od.spent_amount,
            pending_spends: od.pending.len(),
            mt_index: od.output.mt_index,
        })
    }

    /// (index, spendable balance) pairs for fee planning.
    pub fn spendable_balances(&self, at_time_ms: u64) -> Vec<(usize, u128)> {
        self.owned
            .iter()
            .enumerate()
            .map(|(i, od)| (i, self.spendable_at(od, at_time_ms)))
            .collect()
    }

    /// Spend `v_fee` Specks from the UTXO at `utxo_index`.
    ///
    /// Atomic on the local state: marks the spend pending, records its
    /// nullifier, evolves the UTXO's nonce chain and returns the action to
    /// embed in the intent.
    pub fn spend(
        &mut self,
        seed: &[u8; 32],
        utxo_index: usize,
        v_fee: u128,
        current_time_ms: u64,
    ) -> Result<DustSpend, DustError> {
        self.ensure_open()?;
        let pk = Self::check_seed(seed)?;

        let count = self.owned.len();
        if utxo_index >= count {
            return Err(DustError::OutOfBoundsUtxo { index: utxo_index, count });
        }
        if self.owned[utxo_index].output.owner != pk {
            return Err(DustError::InvalidSeed);
        }

        let grace_ms = self.params.dust_grace_period_secs.saturating_mul(1000);
        let drift = current_time_ms.abs_diff(self.last_processed_ms);
        if drift > grace_ms {
            return Err(DustError::InvalidTime {
                time_ms: current_time_ms,
                last_processed_ms: self.last_processed_ms,
            });
        }

        let spendable = self.spendable_at(&self.owned[utxo_index], current_time_ms);
        if v_fee > spendable {
            return Err(DustError::InsufficientDust {
                required: v_fee,
                available: spendable,
            });
        }

        let root = self.commitments.root();
        let od = &mut self.owned[utxo_index];

        let old_nullifier = tagged(
            TAG_NULLIFIER,
            &[seed, &od.output.nonce, &od.output.seq.to_be_bytes()],
        );
        let new_nonce = tagged(TAG_NONCE, &[&od.output.nonce, &v_fee.to_be_bytes()]);
        let new_seq = od.output.seq + 1;
        let remaining = spendable - v_fee;
        let new_commitment = tagged(
            TAG_COMMITMENT,
            &[
                &od.output.owner,
                &new_nonce,
                &new_seq.to_be_bytes(),
                &remaining.to_be_bytes(),
            ],
        );

        let mut proof_preimage = Vec::with_capacity(32 * 4 + 16 + 8 + 8);
        proof_preimage.extend_from_slice(&Sha256::digest(TAG_PROOF));
        proof_preimage.extend_from_slice(&old_nullifier);
        proof_preimage.extend_from_slice(&new_commitment);
        proof_preimage.extend_from_slice(&v_fee.to_be_bytes());
        proof_preimage.extend_from_slice(&root);
        proof_preimage.extend_from_slice(&od.output.mt_index.to_be_bytes());
        proof_preimage.extend_from_slice(&current_time_ms.to_be_bytes());

        od.output.nonce = new_nonce;
        od.output.seq = new_seq;
        od.spent_amount += v_fee;
        od.pending.push(old_nullifier);
        self.pending_nullifiers.insert(old_nullifier);

        debug!(utxo_index, v_fee, "dust spend created");
        Ok(DustSpend {
            old_nullifier,
            new_commitment,
            v_fee,
            proof_preimage,
        })
    }

    /// Wipe nonce material and empty the state. Mandatory before the handle
    /// is discarded; calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for od in &mut self.owned {
            od.output.nonce.zeroize();
            od.generation.nonce.zeroize();
        }
        self.owned.clear();
        self.pending_nullifiers.clear();
        self.closed = true;
    }
}

impl Drop for DustLocalState {
    fn drop(&mut self) {
        self.close();
    }
}
