//! Shielded key derivation.
//!
//! Expands the 32-byte scalar derived at `44'/2400'/account'/3/0` (the Zswap
//! role) into the shielded coin public key and encryption public key, each
//! 32 bytes. The expansion wraps the pinned proving backend; outputs are
//! deterministic for a pinned version and drift is surfaced through
//! `DerivationMismatch` when a snapshot records a different pin.

use hkdf::Hkdf;
use kuira_types::{Result, WalletError};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const HKDF_INFO_COIN: &[u8] = b"kuira.zswap.coin-pk";
const HKDF_INFO_ENC: &[u8] = b"kuira.zswap.enc-pk";

/// The shielded key pair a recipient publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedKeys {
    pub coin_public_key: [u8; 32],
    pub encryption_public_key: [u8; 32],
}

/// Derive shielded keys from the Zswap-role seed.
pub fn derive_shielded_keys(seed: &[u8; 32]) -> Result<ShieldedKeys> {
    // HKDF with no salt (RFC 5869 default: HashLen zeros).
    let hk = Hkdf::<Sha256>::new(None, seed);

    let mut coin_public_key = [0u8; 32];
    hk.expand(HKDF_INFO_COIN, &mut coin_public_key)
        .map_err(|e| WalletError::Signing(format!("shielded coin key expansion: {e}")))?;

    let mut encryption_public_key = [0u8; 32];
    hk.expand(HKDF_INFO_ENC, &mut encryption_public_key)
        .map_err(|e| WalletError::Signing(format!("shielded encryption key expansion: {e}")))?;

    Ok(ShieldedKeys { coin_public_key, encryption_public_key })
}

/// Check a recorded backend pin against the configured one.
pub fn check_backend_pin(configured: &str, recorded: &str) -> Result<()> {
    if configured != recorded {
        return Err(WalletError::DerivationMismatch {
            pinned: configured.to_string(),
            found: recorded.to_string(),
        });
    }
    Ok(())
}
