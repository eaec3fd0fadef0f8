//! Mnemonic phrase to master seed conversion.
//!
//! PBKDF2-HMAC-SHA-512 with 2048 iterations, per the standard mnemonic
//! derivation. The phrase must have 12/15/18/21/24 dictionary words with a
//! valid embedded checksum.

use bip39::Mnemonic;
use kuira_types::{Result, WalletError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Upper bound on the passphrase, to keep the stretching step cheap.
pub const MAX_PASSPHRASE_BYTES: usize = 256;

const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// 64-byte master seed. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Wrap raw seed bytes (snapshot restore, tests).
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Seed(bytes)
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print seed bytes.
        f.write_str("Seed(..)")
    }
}

/// Convert a mnemonic phrase and passphrase to the 64-byte master seed.
///
/// Pure and deterministic. Fails with `MnemonicInvalid` on a bad word count,
/// unknown dictionary words, a checksum mismatch, or an oversized passphrase.
pub fn phrase_to_seed(phrase: &str, passphrase: &str) -> Result<Seed> {
    if passphrase.len() > MAX_PASSPHRASE_BYTES {
        return Err(WalletError::MnemonicInvalid(format!(
            "passphrase exceeds {MAX_PASSPHRASE_BYTES} bytes"
        )));
    }

    let word_count = phrase.split_whitespace().count();
    if !VALID_WORD_COUNTS.contains(&word_count) {
        return Err(WalletError::MnemonicInvalid(format!(
            "expected 12/15/18/21/24 words, got {word_count}"
        )));
    }

    let mnemonic = Mnemonic::parse_normalized(phrase)
        .map_err(|e| WalletError::MnemonicInvalid(e.to_string()))?;

    Ok(Seed(mnemonic.to_seed_normalized(passphrase)))
}
