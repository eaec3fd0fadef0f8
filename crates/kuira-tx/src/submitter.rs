//! Submission and confirmation.
//!
//! Submits the framed extrinsic over node RPC, then watches the indexer
//! subscription for the matching transaction hash. Reservation disposition:
//! confirmed → Spent, rejected/failed → Available, timed out → left Pending
//! for the caller to reconcile. Dropping the future mid-flight aborts the
//! subscription and leaves reservations Pending.

use std::sync::Arc;

use futures::StreamExt;
use kuira_codec::envelope::wrap_extrinsic;
use kuira_store::UtxoStore;
use kuira_sync::{IndexerClient, WalletSyncUpdate};
use kuira_types::{NetworkConfig, Result, SubmissionResult, UtxoId, WalletError};
use tracing::{debug, info, warn};

pub struct Submitter {
    node: Arc<dyn crate::NodeClient>,
    indexer: Arc<dyn IndexerClient>,
    store: UtxoStore,
    config: NetworkConfig,
}

impl Submitter {
    pub fn new(
        node: Arc<dyn crate::NodeClient>,
        indexer: Arc<dyn IndexerClient>,
        store: UtxoStore,
        config: NetworkConfig,
    ) -> Self {
        Self { node, indexer, store, config }
    }

    /// Submit canonical encoded bytes and wait for finalization.
    ///
    /// `input_ids` are the reserved rows backing the intent; they are marked
    /// Spent on success and released on rejection or in-block failure.
    pub async fn submit_and_wait(
        &self,
        encoded: &[u8],
        input_ids: &[UtxoId],
        sender_address: &str,
    ) -> Result<SubmissionResult> {
        let extrinsic = wrap_extrinsic(encoded);

        let tx_hash = match self.node.submit_extrinsic(&extrinsic).await {
            Ok(hash) => hash,
            Err(err) => {
                self.release_on_definite_rejection(&err, input_ids)?;
                return Err(err);
            }
        };
        info!(tx_hash = %kuira_types::to_hex(&tx_hash), "submitted, awaiting confirmation");

        // Subscribe from the current head: only updates after submission
        // matter for this transaction.
        let mut updates = self
            .indexer
            .subscribe_unshielded(sender_address, None)
            .await?;

        let window = std::time::Duration::from_millis(self.config.confirmation_timeout_ms);
        let confirmation = tokio::time::timeout(window, async {
            while let Some(update) = updates.next().await {
                match update {
                    Ok(WalletSyncUpdate::Transaction(tx)) if tx.tx_hash == tx_hash => {
                        return Some(tx);
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(error = %err, "confirmation stream error");
                        return None;
                    }
                }
            }
            None
        })
        .await;

        match confirmation {
            Ok(Some(tx)) if tx.status.guaranteed_succeeded() => {
                self.store.mark_spent(input_ids, tx.block_time_ms)?;
                info!(block_height = ?tx.block_height, "transaction confirmed");
                Ok(SubmissionResult::Success {
                    tx_hash,
                    block_height: tx.block_height,
                })
            }
            Ok(Some(tx)) => {
                self.store.unlock(input_ids)?;
                let reason = format!("transaction {:?} in block", tx.status);
                warn!(reason, "transaction failed");
                Ok(SubmissionResult::Failed { reason })
            }
            Ok(None) | Err(_) => {
                // Timed out or the stream died: the outcome is unknown, so
                // reservations stay Pending for a later disposition.
                debug!("confirmation window elapsed");
                Ok(SubmissionResult::Pending { tx_hash })
            }
        }
    }

    /// Release reservations for errors that definitely mean the node did
    /// not accept the transaction. Transport-level errors keep them.
    fn release_on_definite_rejection(&self, err: &WalletError, input_ids: &[UtxoId]) -> Result<()> {
        match err {
            WalletError::NodeRpc { .. } | WalletError::TransactionRejected { .. } => {
                warn!(error = %err, "submission rejected, releasing reservations");
                self.store.unlock(input_ids)
            }
            _ => Ok(()),
        }
    }
}
