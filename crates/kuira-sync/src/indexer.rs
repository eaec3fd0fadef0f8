//! The indexer client trait, its update types, and the reconnecting wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kuira_types::{Result, TokenType, WalletError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Confirmation status of a transaction as the indexer reports it.
/// `PartialSuccess` means the guaranteed segment succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl TransactionStatus {
    /// Did the guaranteed segment land?
    pub fn guaranteed_succeeded(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::PartialSuccess)
    }
}

/// A UTXO as carried by indexer updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerUtxo {
    pub intent_hash: [u8; 32],
    pub output_index: u32,
    pub owner: String,
    pub value: u128,
    pub token_type: TokenType,
}

/// One confirmed transaction touching the subscribed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub tx_id: u64,
    pub tx_hash: [u8; 32],
    pub status: TransactionStatus,
    pub block_height: Option<u64>,
    pub block_time_ms: u64,
    pub created_utxos: Vec<IndexerUtxo>,
    pub spent_utxos: Vec<IndexerUtxo>,
}

/// Stream element: either a transaction or a progress marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletSyncUpdate {
    Transaction(TransactionUpdate),
    Progress { highest_tx_id: u64 },
}

/// Narrow adapter over the indexer transport.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Ordered stream of updates for `address`. With `from_tx_id` set the
    /// stream starts at the next update after that cursor; otherwise it
    /// starts at the current head.
    async fn subscribe_unshielded(
        &self,
        address: &str,
        from_tx_id: Option<u64>,
    ) -> Result<BoxStream<'static, Result<WalletSyncUpdate>>>;

    /// One-shot fetch of the length-prefixed dust event stream for
    /// `address`, up to `up_to_block` when given. May take minutes on first
    /// run; no timeout is applied here.
    async fn query_dust_events(&self, address: &str, up_to_block: Option<u64>) -> Result<Vec<u8>>;
}

/// Reconnecting wrapper: resubscribes on transport failure with bounded
/// exponential backoff, resuming from the last seen transaction id. Emits
/// `IndexerDisconnected` once and ends the stream after the retry budget is
/// exhausted.
pub struct ReconnectingIndexer {
    inner: Arc<dyn IndexerClient>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

struct ResubscribeState {
    inner: Arc<dyn IndexerClient>,
    address: String,
    cursor: Option<u64>,
    stream: Option<BoxStream<'static, Result<WalletSyncUpdate>>>,
    retries_left: u32,
    max_retries: u32,
    delay: Duration,
    base_delay: Duration,
    max_delay: Duration,
    done: bool,
}

impl ReconnectingIndexer {
    pub fn new(inner: Arc<dyn IndexerClient>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// A stream with the same contract as `subscribe_unshielded`, surviving
    /// transport drops.
    pub fn subscribe(
        &self,
        address: &str,
        from_tx_id: Option<u64>,
    ) -> BoxStream<'static, Result<WalletSyncUpdate>> {
        let state = ResubscribeState {
            inner: Arc::clone(&self.inner),
            address: address.to_string(),
            cursor: from_tx_id,
            stream: None,
            retries_left: self.max_retries,
            max_retries: self.max_retries,
            delay: self.base_delay,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            done: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                if state.stream.is_none() {
                    match state
                        .inner
                        .subscribe_unshielded(&state.address, state.cursor)
                        .await
                    {
                        Ok(stream) => {
                            state.stream = Some(stream);
                        }
                        Err(err) => {
                            if state.retries_left == 0 {
                                warn!(error = %err, "indexer retry budget exhausted");
                                state.done = true;
                                return Some((Err(WalletError::IndexerDisconnected), state));
                            }
                            debug!(error = %err, delay_ms = state.delay.as_millis() as u64,
                                "indexer subscribe failed, backing off");
                            tokio::time::sleep(state.delay).await;
                            state.retries_left -= 1;
                            state.delay = (state.delay * 2).min(state.max_delay);
                            continue;
                        }
                    }
                }

                let next = match state.stream.as_mut() {
                    Some(stream) => stream.next().await,
                    None => continue,
                };
                match next {
                    Some(Ok(update)) => {
                        if let WalletSyncUpdate::Transaction(tx) = &update {
                            state.cursor = Some(tx.tx_id);
                        }
                        // A healthy update restores the budget.
                        state.retries_left = state.max_retries;
                        state.delay = state.base_delay;
                        return Some((Ok(update), state));
                    }
                    Some(Err(err)) => {
                        debug!(error = %err, "indexer stream error, reconnecting");
                        state.stream = None;
                    }
                    None => {
                        debug!("indexer stream ended, reconnecting");
                        state.stream = None;
                    }
                }
            }
        })
        .boxed()
    }
}
