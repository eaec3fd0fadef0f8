//! Coin selection and fee planning.
//!
//! - Night inputs: smallest-first prefix over a value-sorted view (more,
//!   smaller inputs; a larger anonymity set against amount analysis)
//! - Fee: first-pass encoded size × specks-per-byte
//! - Dust coverage: smallest-first over spendable dust balances, the last
//!   pick trimmed to cover the fee exactly
//!
//! Everything here is pure; the store wraps the same selection logic in its
//! reservation transaction.

use kuira_types::{DustError, Utxo, WalletError};
use serde::{Deserialize, Serialize};

/// Result of Night coin selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen rows, a prefix of the sorted input.
    pub rows: Vec<Utxo>,
    /// `sum(rows) - required`.
    pub change: u128,
}

/// Select the smallest prefix of `sorted_available` whose values sum to at
/// least `required`.
///
/// `sorted_available` must be sorted by value ascending; rows of equal value
/// may appear in any stable order.
pub fn select_smallest_first(
    sorted_available: &[Utxo],
    required: u128,
) -> Result<Selection, WalletError> {
    let mut rows = Vec::new();
    let mut sum = 0u128;

    for utxo in sorted_available {
        rows.push(utxo.clone());
        sum = sum.saturating_add(utxo.value);
        if sum >= required {
            return Ok(Selection { rows, change: sum - required });
        }
    }

    Err(WalletError::InsufficientFunds { required, available: sum })
}

/// Fee in Specks for an encoded transaction of `size_bytes`.
pub fn fee_for_size(size_bytes: usize, specks_per_byte: u128) -> u128 {
    (size_bytes as u128).saturating_mul(specks_per_byte)
}

/// One chosen dust UTXO and the share of the fee it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustSelection {
    /// Index into the dust state's owned-UTXO list.
    pub utxo_index: usize,
    /// Specks this UTXO contributes. The sum over a selection equals the fee.
    pub amount: u128,
}

/// Pick dust UTXOs to cover `fee`, smallest spendable balance first. The
/// last (largest) pick is trimmed so the covered amounts sum to exactly the
/// fee.
///
/// `balances` pairs each owned dust UTXO index with its spendable balance at
/// spend time; order does not matter.
pub fn select_dust(balances: &[(usize, u128)], fee: u128) -> Result<Vec<DustSelection>, DustError> {
    if fee == 0 {
        return Ok(Vec::new());
    }

    let mut sorted: Vec<_> = balances.to_vec();
    sorted.sort_by_key(|&(_, balance)| balance);

    let mut picks = Vec::new();
    let mut covered = 0u128;

    for (index, balance) in sorted {
        if balance == 0 {
            continue;
        }
        let remaining = fee - covered;
        let amount = balance.min(remaining);
        picks.push(DustSelection { utxo_index: index, amount });
        covered += amount;
        if covered == fee {
            return Ok(picks);
        }
    }

    Err(DustError::InsufficientDust { required: fee, available: covered })
}
