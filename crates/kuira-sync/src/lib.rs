//! Indexer consumer: ordered transaction-update streams and the one-shot
//! dust event fetch.
//!
//! The transport (a persistent indexer subscription) lives outside the core
//! behind the `IndexerClient` trait. `ReconnectingIndexer` turns a fallible
//! transport into the reliable, ordered, restartable stream the rest of the
//! core assumes; `SyncEngine` folds updates into the UTXO store.

pub mod engine;
pub mod indexer;

pub use engine::{sync_dust, SyncEngine};
pub use indexer::{
    IndexerClient, IndexerUtxo, ReconnectingIndexer, TransactionStatus, TransactionUpdate,
    WalletSyncUpdate,
};
