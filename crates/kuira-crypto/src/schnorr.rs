//! BIP-340 Schnorr signing and verification over secp256k1.
//!
//! Messages of arbitrary length (empty allowed) are reduced to a 32-byte
//! tagged digest before signing. The secret-key buffer handed to `sign` is
//! zeroed on every return path, error paths included; `sign_sensitive`
//! additionally zeroes the message buffer.

use kuira_types::{Result, WalletError};
use secp256k1::{schnorr, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Upper bound on message length; longer inputs fail with
/// `SigningInputTooLarge`.
pub const MAX_MESSAGE_BYTES: usize = 1 << 20;

const MESSAGE_TAG: &[u8] = b"kuira/signing/message";

/// Zeroes the wrapped buffer when the guard leaves scope, on every path.
struct WipeGuard<'a, Z: Zeroize + ?Sized>(&'a mut Z);

impl<Z: Zeroize + ?Sized> Drop for WipeGuard<'_, Z> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// BIP-340 style tagged digest: SHA256(SHA256(tag) ‖ SHA256(tag) ‖ msg).
fn message_digest(message: &[u8]) -> [u8; 32] {
    let tag_hash: [u8; 32] = Sha256::digest(MESSAGE_TAG).into();
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(message);
    hasher.finalize().into()
}

fn check_len(message: &[u8]) -> Result<()> {
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(WalletError::SigningInputTooLarge {
            len: message.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }
    Ok(())
}

fn sign_digest(secret: &[u8; 32], digest: [u8; 32]) -> Result<[u8; 64]> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(secret)
        .map_err(|e| WalletError::Signing(format!("invalid secret key: {e}")))?;
    let keypair = Keypair::from_secret_key(&secp, &sk);
    let sig = secp.sign_schnorr(&Message::from_digest(digest), &keypair);
    Ok(sig.serialize())
}

/// Sign a message. The secret buffer is zeroed before this returns,
/// whether signing succeeded or not.
pub fn sign(secret: &mut [u8; 32], message: &[u8]) -> Result<[u8; 64]> {
    let guard = WipeGuard(secret);
    check_len(message)?;
    let digest = message_digest(message);
    sign_digest(&*guard.0, digest)
}

/// Sign a message derived from secret material. Both the secret and the
/// message buffer are zeroed before this returns.
pub fn sign_sensitive(secret: &mut [u8; 32], message: &mut [u8]) -> Result<[u8; 64]> {
    let msg_guard = WipeGuard(message);
    let key_guard = WipeGuard(secret);
    check_len(&*msg_guard.0)?;
    let digest = message_digest(&*msg_guard.0);
    sign_digest(&*key_guard.0, digest)
}

/// Verify a signature. Returns `false` on any failure, malformed inputs
/// included.
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    if message.len() > MAX_MESSAGE_BYTES {
        return false;
    }
    let secp = Secp256k1::new();
    let Ok(pk) = XOnlyPublicKey::from_slice(public) else {
        return false;
    };
    let Ok(sig) = schnorr::Signature::from_slice(signature) else {
        return false;
    };
    let msg = Message::from_digest(message_digest(message));
    secp.verify_schnorr(&sig, &msg, &pk).is_ok()
}

/// X-only public key for a secret scalar. Does not consume or zero the
/// secret; key containers own their cleanup.
pub fn public_key(secret: &[u8; 32]) -> Result<[u8; 32]> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(secret)
        .map_err(|e| WalletError::Signing(format!("invalid secret key: {e}")))?;
    let keypair = Keypair::from_secret_key(&secp, &sk);
    let (xonly, _parity) = XOnlyPublicKey::from_keypair(&keypair);
    Ok(xonly.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> [u8; 32] {
        let mut sk = [0u8; 32];
        sk[31] = 3;
        sk
    }

    #[test]
    fn sign_verify_round_trip() {
        let mut sk = test_secret();
        let pk = public_key(&sk).unwrap();
        let sig = sign(&mut sk, b"transfer 125 night").unwrap();
        assert!(verify(&pk, b"transfer 125 night", &sig));
    }

    #[test]
    fn empty_message_supported() {
        let mut sk = test_secret();
        let pk = public_key(&sk).unwrap();
        let sig = sign(&mut sk, b"").unwrap();
        assert!(verify(&pk, b"", &sig));
    }

    #[test]
    fn wrong_message_fails() {
        let mut sk = test_secret();
        let pk = public_key(&sk).unwrap();
        let sig = sign(&mut sk, b"message a").unwrap();
        assert!(!verify(&pk, b"message b", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let mut sk = test_secret();
        let sig = sign(&mut sk, b"msg").unwrap();
        let mut other = test_secret();
        other[0] = 1;
        let other_pk = public_key(&other).unwrap();
        assert!(!verify(&other_pk, b"msg", &sig));
    }

    #[test]
    fn malformed_inputs_verify_false() {
        assert!(!verify(&[0u8; 32], b"msg", &[0u8; 64]));
    }

    #[test]
    fn secret_zeroed_after_sign() {
        let mut sk = test_secret();
        let _ = sign(&mut sk, b"msg").unwrap();
        assert_eq!(sk, [0u8; 32]);
    }

    #[test]
    fn secret_zeroed_on_error_path() {
        let mut sk = test_secret();
        let big = vec![0u8; MAX_MESSAGE_BYTES + 1];
        let err = sign(&mut sk, &big).unwrap_err();
        assert!(matches!(err, WalletError::SigningInputTooLarge { .. }));
        assert_eq!(sk, [0u8; 32]);
    }

    #[test]
    fn sensitive_message_zeroed() {
        let mut sk = test_secret();
        let mut msg = b"derived from dust secrets".to_vec();
        let _ = sign_sensitive(&mut sk, &mut msg).unwrap();
        assert_eq!(sk, [0u8; 32]);
        assert!(msg.iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_message_rejected() {
        let mut sk = test_secret();
        let big = vec![0u8; MAX_MESSAGE_BYTES + 1];
        assert!(matches!(
            sign(&mut sk, &big),
            Err(WalletError::SigningInputTooLarge { .. })
        ));
        assert!(!verify(&[1u8; 32], &big, &[0u8; 64]));
    }
}
