//! Shared value types and the error taxonomy for the kuira wallet core.
//!
//! Everything here is a plain value type: the store, the dust engine and the
//! submitter own their state, components exchange these structs by value.

use thiserror::Error;

pub mod config;
pub mod intent;
pub mod utxo;

pub use config::{DustParameters, NetworkConfig, NetworkId};
pub use intent::{
    DustActions, DustRegistration, DustSpend, Intent, Signature, SubmissionResult, UnshieldedOffer,
};
pub use utxo::{TokenBalance, Utxo, UtxoId, UtxoOutput, UtxoSpend, UtxoState};

/// 32-byte token type tag. The all-zero tag is the native Night token.
pub type TokenType = [u8; 32];

/// 32-byte intent hash identifying the transaction that created a UTXO.
pub type IntentHash = [u8; 32];

/// The native Night token tag.
pub const NIGHT_TOKEN: TokenType = [0u8; 32];

/// Wallet core error taxonomy.
#[derive(Debug, Error)]
pub enum WalletError {
    // --- Input errors: deterministic, side-effect-free ---
    #[error("invalid mnemonic: {0}")]
    MnemonicInvalid(String),

    #[error("invalid address: {reason}")]
    AddressInvalid { reason: String },

    #[error("amount must be positive")]
    AmountNonPositive,

    #[error("address must not be blank")]
    BlankAddress,

    #[error("signing input too large: {len} bytes (max {max})")]
    SigningInputTooLarge { len: usize, max: usize },

    // --- Funds ---
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u128, available: u128 },

    // --- Storage ---
    #[error("storage error: {0}")]
    Storage(String),

    // --- Crypto ---
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature verification failed: {0}")]
    Verification(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("derivation backend mismatch: pinned {pinned}, found {found}")]
    DerivationMismatch { pinned: String, found: String },

    // --- Dust ---
    #[error(transparent)]
    Dust(#[from] DustError),

    // --- Network ---
    #[error("node network error: {0}")]
    NodeNetwork(String),

    #[error("node returned HTTP status {status}")]
    NodeHttp { status: u16 },

    #[error("node request timed out")]
    NodeTimeout,

    #[error("node RPC error {code}: {message}")]
    NodeRpc { code: i64, message: String },

    #[error("indexer disconnected after exhausting retries")]
    IndexerDisconnected,

    // --- Rejection ---
    #[error("transaction rejected by node: {reason}")]
    TransactionRejected { reason: String },

    #[error("transaction failed in block: {reason}")]
    TransactionFailed { reason: String },
}

/// Dust engine error kinds. None are retriable within the engine.
#[derive(Debug, Error)]
pub enum DustError {
    #[error("invalid dust event stream: {0}")]
    InvalidEvents(String),

    #[error("invalid dust seed")]
    InvalidSeed,

    #[error("insufficient dust: required {required}, available {available}")]
    InsufficientDust { required: u128, available: u128 },

    #[error("dust utxo index {index} out of bounds (count {count})")]
    OutOfBoundsUtxo { index: usize, count: usize },

    #[error("spend time {time_ms} outside grace window of last processed time {last_processed_ms}")]
    InvalidTime { time_ms: u64, last_processed_ms: u64 },
}

pub type Result<T> = std::result::Result<T, WalletError>;

/// Encode bytes as lower-case hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string, accepting an optional `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| WalletError::Encoding(format!("invalid hex: {e}")))
}

/// Decode a hex string into a fixed 32-byte array.
pub fn hex_to_array32(s: &str) -> Result<[u8; 32]> {
    let bytes = from_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| WalletError::Encoding("expected 32 bytes of hex".into()))
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
