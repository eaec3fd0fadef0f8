//! Persistent UTXO store.
//!
//! Backed by sled named trees with bincode-encoded rows:
//!   utxos — intent_hash ‖ output_index_be → bincode(Utxo)
//!   meta  — utf8 key bytes               → raw bytes
//!
//! The store is the sole owner of UTXO rows. State transitions go through
//! the API only: Available→Pending (reservation), Pending→Available
//! (release), Pending→Spent (confirmation) and Available→Spent (spend
//! observed from another device on the same keys).
//!
//! Reservation is race-free: `select_and_lock` holds an internal async mutex
//! across its read-select-update sequence and applies the update as one
//! atomic sled batch, so concurrent callers never receive overlapping rows.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::Stream;
use kuira_types::{
    Result, TokenBalance, TokenType, Utxo, UtxoId, UtxoState, WalletError,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// State transitions delivered by the indexer consumer.
#[derive(Debug, Clone)]
pub enum UtxoEvent {
    /// A confirmed incoming output; inserted as Available.
    Created(Utxo),
    /// A confirmed spend of one of our rows, ours or from another device.
    SpentObserved { id: UtxoId, spent_at: u64 },
}

struct Inner {
    _db: sled::Db,
    utxos: sled::Tree,
    meta: sled::Tree,
    reserve_lock: Mutex<()>,
    changes: broadcast::Sender<String>,
}

/// Cloneable handle to the UTXO database.
#[derive(Clone)]
pub struct UtxoStore {
    inner: Arc<Inner>,
}

fn storage_err(e: impl std::fmt::Display) -> WalletError {
    WalletError::Storage(e.to_string())
}

fn row_key(id: &UtxoId) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(&id.intent_hash);
    key[32..].copy_from_slice(&id.output_index.to_be_bytes());
    key
}

fn encode_row(utxo: &Utxo) -> Result<Vec<u8>> {
    bincode::serialize(utxo).map_err(storage_err)
}

fn decode_row(bytes: &[u8]) -> Result<Utxo> {
    bincode::deserialize(bytes).map_err(storage_err)
}

impl UtxoStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path).map_err(storage_err)?)
    }

    /// Ephemeral store for tests; dropped with the process.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let utxos = db.open_tree("utxos").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        let (changes, _) = broadcast::channel(256);
        Ok(Self {
            inner: Arc::new(Inner {
                _db: db,
                utxos,
                meta,
                reserve_lock: Mutex::new(()),
                changes,
            }),
        })
    }

    fn notify(&self, address: &str) {
        // No receivers is fine; nobody is observing.
        let _ = self.inner.changes.send(address.to_string());
    }

    /// Fetch one row.
    pub fn get(&self, id: &UtxoId) -> Result<Option<Utxo>> {
        match self.inner.utxos.get(row_key(id)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Upsert a row as-is. Indexer consumer and tests only.
    pub fn put(&self, utxo: &Utxo) -> Result<()> {
        self.inner
            .utxos
            .insert(row_key(&utxo.id), encode_row(utxo)?)
            .map_err(storage_err)?;
        self.notify(&utxo.owner_address);
        Ok(())
    }

    /// Apply an indexer-observed event.
    pub fn apply_event(&self, event: &UtxoEvent) -> Result<()> {
        match event {
            UtxoEvent::Created(utxo) => {
                // Re-delivery of a known output must not resurrect it.
                if self.get(&utxo.id)?.is_some() {
                    debug!(intent = %kuira_types::to_hex(&utxo.id.intent_hash), "skipping known utxo");
                    return Ok(());
                }
                let mut row = utxo.clone();
                row.state = UtxoState::Available;
                row.spent_at = None;
                self.put(&row)
            }
            UtxoEvent::SpentObserved { id, spent_at } => {
                let Some(mut row) = self.get(id)? else {
                    debug!(output_index = id.output_index, "spend for unknown utxo ignored");
                    return Ok(());
                };
                match row.state {
                    UtxoState::Pending | UtxoState::Available => {
                        row.state = UtxoState::Spent;
                        row.spent_at = Some(*spent_at);
                        self.put(&row)
                    }
                    UtxoState::Spent => Ok(()),
                }
            }
        }
    }

    fn rows_for_owner(&self, address: &str) -> Result<Vec<Utxo>> {
        let mut rows = Vec::new();
        for item in self.inner.utxos.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let row = decode_row(&bytes)?;
            if row.owner_address == address {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn available_rows(&self, address: &str, token_type: &TokenType) -> Result<Vec<Utxo>> {
        Ok(self
            .rows_for_owner(address)?
            .into_iter()
            .filter(|r| r.state == UtxoState::Available && r.token_type == *token_type)
            .collect())
    }

    /// Current per-token balances for an address, token order stable.
    pub fn balances(&self, address: &str) -> Result<Vec<TokenBalance>> {
        let mut by_token: BTreeMap<TokenType, TokenBalance> = BTreeMap::new();
        for row in self.rows_for_owner(address)? {
            let entry = by_token.entry(row.token_type).or_insert(TokenBalance {
                token_type: row.token_type,
                available: 0,
                pending: 0,
                utxo_count: 0,
            });
            match row.state {
                UtxoState::Available => {
                    entry.available += row.value;
                    entry.utxo_count += 1;
                }
                UtxoState::Pending => {
                    entry.pending += row.value;
                    entry.utxo_count += 1;
                }
                UtxoState::Spent => {}
            }
        }
        Ok(by_token.into_values().collect())
    }

    /// Live balance view: emits the current snapshot immediately, then a
    /// fresh snapshot whenever rows of `address` change.
    pub fn observe_balances(&self, address: &str) -> impl Stream<Item = Vec<TokenBalance>> {
        let store = self.clone();
        let address = address.to_string();
        let rx = self.inner.changes.subscribe();

        futures::stream::unfold(
            (store, address, rx, true),
            |(store, address, mut rx, first)| async move {
                if first {
                    let snapshot = store.balances(&address).unwrap_or_default();
                    return Some((snapshot, (store, address, rx, false)));
                }
                loop {
                    match rx.recv().await {
                        Ok(changed) if changed == address => {
                            let snapshot = store.balances(&address).unwrap_or_default();
                            return Some((snapshot, (store, address, rx, false)));
                        }
                        Ok(_) => continue,
                        // Missed notifications collapse into one re-read.
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let snapshot = store.balances(&address).unwrap_or_default();
                            return Some((snapshot, (store, address, rx, false)));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )
    }

    /// Atomically reserve the smallest prefix of Available rows of
    /// (address, token) summing to at least `required`, moving exactly those
    /// rows to Pending. On `InsufficientFunds` nothing is mutated.
    pub async fn select_and_lock(
        &self,
        address: &str,
        token_type: &TokenType,
        required: u128,
    ) -> Result<Vec<Utxo>> {
        let _guard = self.inner.reserve_lock.lock().await;
        let mut selection = self.plan_selection(address, token_type, required)?;
        self.commit_reservation(address, std::iter::once(&selection))?;
        for row in &mut selection {
            row.state = UtxoState::Pending;
        }
        Ok(selection)
    }

    /// Multi-token reservation with the same contract, all-or-nothing: if
    /// any token's funds are short, no row of any token is mutated.
    pub async fn select_and_lock_multi(
        &self,
        address: &str,
        requests: &BTreeMap<TokenType, u128>,
    ) -> Result<BTreeMap<TokenType, Vec<Utxo>>> {
        let _guard = self.inner.reserve_lock.lock().await;

        let mut selections = BTreeMap::new();
        for (token_type, required) in requests {
            let rows = self.plan_selection(address, token_type, *required)?;
            selections.insert(*token_type, rows);
        }
        self.commit_reservation(address, selections.values())?;
        for rows in selections.values_mut() {
            for row in rows {
                row.state = UtxoState::Pending;
            }
        }
        Ok(selections)
    }

    /// Read + select, no mutation. Caller holds the reservation lock.
    fn plan_selection(
        &self,
        address: &str,
        token_type: &TokenType,
        required: u128,
    ) -> Result<Vec<Utxo>> {
        let mut rows = self.available_rows(address, token_type)?;
        rows.sort_by(|a, b| a.value.cmp(&b.value).then(a.id.cmp(&b.id)));
        let selection = kuira_planner::select_smallest_first(&rows, required)?;
        Ok(selection.rows)
    }

    /// Move all selected rows to Pending in one atomic batch.
    fn commit_reservation<'a>(
        &self,
        address: &str,
        selections: impl Iterator<Item = &'a Vec<Utxo>>,
    ) -> Result<()> {
        let mut batch = sled::Batch::default();
        let mut count = 0usize;
        for rows in selections {
            for row in rows {
                let mut pending = row.clone();
                pending.state = UtxoState::Pending;
                batch.insert(&row_key(&pending.id)[..], encode_row(&pending)?);
                count += 1;
            }
        }
        self.inner.utxos.apply_batch(batch).map_err(storage_err)?;
        debug!(address, rows = count, "reserved utxos");
        self.notify(address);
        Ok(())
    }

    /// Release reservations: Pending→Available. Rows in other states are
    /// left untouched.
    pub fn unlock(&self, ids: &[UtxoId]) -> Result<()> {
        self.transition_pending(ids, UtxoState::Available, None)
    }

    /// Finalize reservations: Pending→Spent.
    pub fn mark_spent(&self, ids: &[UtxoId], spent_at: u64) -> Result<()> {
        self.transition_pending(ids, UtxoState::Spent, Some(spent_at))
    }

    fn transition_pending(
        &self,
        ids: &[UtxoId],
        target: UtxoState,
        spent_at: Option<u64>,
    ) -> Result<()> {
        let mut batch = sled::Batch::default();
        let mut touched_addresses = Vec::new();
        for id in ids {
            let Some(mut row) = self.get(id)? else {
                warn!(output_index = id.output_index, "transition for unknown utxo ignored");
                continue;
            };
            if row.state != UtxoState::Pending {
                warn!(
                    ?target,
                    current = ?row.state,
                    "utxo not pending, transition skipped"
                );
                continue;
            }
            row.state = target;
            row.spent_at = spent_at;
            if !touched_addresses.contains(&row.owner_address) {
                touched_addresses.push(row.owner_address.clone());
            }
            batch.insert(&row_key(id)[..], encode_row(&row)?);
        }
        self.inner.utxos.apply_batch(batch).map_err(storage_err)?;
        for address in touched_addresses {
            self.notify(&address);
        }
        Ok(())
    }

    /// Persist a small metadata blob (sync cursors, dust snapshots).
    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .meta
            .insert(key.as_bytes(), value)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .meta
            .get(key.as_bytes())
            .map_err(storage_err)?
            .map(|v| v.to_vec()))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
