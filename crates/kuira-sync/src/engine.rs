//! Folds indexer updates into the UTXO store.

use futures::stream::BoxStream;
use futures::StreamExt;
use kuira_dust::DustLocalState;
use kuira_store::{UtxoEvent, UtxoStore};
use kuira_types::{Result, Utxo, UtxoId, UtxoState};
use tracing::{debug, info, warn};

use crate::indexer::{IndexerClient, TransactionUpdate, WalletSyncUpdate};

/// Meta key under which the highest seen transaction id is persisted.
const CURSOR_META_KEY: &str = "sync/highest_tx_id";

/// Applies confirmed indexer updates for one tracked address.
pub struct SyncEngine {
    store: UtxoStore,
    /// The tracked unshielded address.
    address: String,
    /// X-only public key the tracked address spends with. Indexer updates
    /// do not carry it, so created rows get it from here.
    owner_public_key: [u8; 32],
}

impl SyncEngine {
    pub fn new(store: UtxoStore, address: &str, owner_public_key: [u8; 32]) -> Self {
        Self {
            store,
            address: address.to_string(),
            owner_public_key,
        }
    }

    /// Persisted resume cursor, if any.
    pub fn cursor(&self) -> Result<Option<u64>> {
        Ok(self.store.get_meta(CURSOR_META_KEY)?.and_then(|bytes| {
            let arr: [u8; 8] = bytes.try_into().ok()?;
            Some(u64::from_be_bytes(arr))
        }))
    }

    fn store_cursor(&self, tx_id: u64) -> Result<()> {
        self.store.put_meta(CURSOR_META_KEY, &tx_id.to_be_bytes())
    }

    /// Apply one update.
    pub fn apply_update(&self, update: &WalletSyncUpdate) -> Result<()> {
        match update {
            WalletSyncUpdate::Transaction(tx) => self.apply_transaction(tx),
            WalletSyncUpdate::Progress { highest_tx_id } => {
                debug!(highest_tx_id, "sync progress");
                self.store_cursor(*highest_tx_id)
            }
        }
    }

    fn apply_transaction(&self, tx: &TransactionUpdate) -> Result<()> {
        if !tx.status.guaranteed_succeeded() {
            debug!(tx_id = tx.tx_id, "skipping failed transaction");
            self.store_cursor(tx.tx_id)?;
            return Ok(());
        }

        for spent in &tx.spent_utxos {
            if spent.owner != self.address {
                continue;
            }
            self.store.apply_event(&UtxoEvent::SpentObserved {
                id: UtxoId {
                    intent_hash: spent.intent_hash,
                    output_index: spent.output_index,
                },
                spent_at: tx.block_time_ms,
            })?;
        }

        for created in &tx.created_utxos {
            if created.owner != self.address {
                warn!(owner = %created.owner, "created utxo for foreign address ignored");
                continue;
            }
            self.store.apply_event(&UtxoEvent::Created(Utxo {
                id: UtxoId {
                    intent_hash: created.intent_hash,
                    output_index: created.output_index,
                },
                owner_address: created.owner.clone(),
                owner_public_key: self.owner_public_key,
                value: created.value,
                token_type: created.token_type,
                state: UtxoState::Available,
                created_at: tx.block_time_ms,
                spent_at: None,
            }))?;
        }

        info!(
            tx_id = tx.tx_id,
            created = tx.created_utxos.len(),
            spent = tx.spent_utxos.len(),
            "applied transaction update"
        );
        self.store_cursor(tx.tx_id)
    }

    /// Drain a subscription, applying every update. Returns when the stream
    /// ends; an `Err` element (e.g. `IndexerDisconnected`) is surfaced.
    pub async fn run(
        &self,
        mut updates: BoxStream<'_, Result<WalletSyncUpdate>>,
    ) -> Result<()> {
        while let Some(update) = updates.next().await {
            self.apply_update(&update?)?;
        }
        Ok(())
    }
}

/// One-shot dust refresh: fetch the replayable event stream and fold it into
/// `state`. Unbounded; the first run can take minutes.
pub async fn sync_dust(
    client: &dyn IndexerClient,
    address: &str,
    up_to_block: Option<u64>,
    state: &mut DustLocalState,
    seed: &[u8; 32],
) -> Result<()> {
    let bytes = client.query_dust_events(address, up_to_block).await?;
    debug!(bytes = bytes.len(), "replaying dust events");
    state.replay(seed, &bytes)?;
    Ok(())
}
