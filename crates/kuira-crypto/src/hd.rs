//! Hardened hierarchical key derivation.
//!
//! Standard HMAC-SHA-512 child derivation over secp256k1: the master node
//! comes from the 64-byte seed, children along
//! `44' / 2400' / account' / role / index` with the three leading indices
//! hardened. Equal seeds yield equal raw private keys at equal paths.

use hmac::{Hmac, Mac};
use kuira_types::{Result, WalletError};
use secp256k1::{Keypair, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::mnemonic::Seed;

type HmacSha512 = Hmac<Sha512>;

/// Purpose index (hardened) of the derivation path.
pub const PURPOSE: u32 = 44;
/// Registered coin type (hardened) of the network.
pub const COIN_TYPE: u32 = 2400;
/// Hardened index offset.
pub const HARDENED: u32 = 1 << 31;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// Fourth path index. Used verbatim as the derivation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    NightExternal = 0,
    NightInternal = 1,
    Dust = 2,
    Zswap = 3,
    Metadata = 4,
}

impl Role {
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// A derived key node: private scalar, chain code, x-only public key.
///
/// The holder exclusively owns the secret parts. `clear()` zeroes all three
/// fields; dropping the node does the same.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    secret: [u8; 32],
    chain_code: [u8; 32],
    public: [u8; 32],
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DerivedKey(pk={})", hex::encode(self.public))
    }
}

impl DerivedKey {
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// X-only public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Zero the node's key material in place. The node is unusable afterwards.
    pub fn clear(&mut self) {
        self.zeroize();
    }

    /// Derive one child. `hardened` children commit to the parent secret,
    /// non-hardened ones to the parent public key.
    pub fn derive_child(&self, index: u32, hardened: bool) -> Result<DerivedKey> {
        let secp = Secp256k1::new();
        let parent = SecretKey::from_slice(&self.secret)
            .map_err(|e| WalletError::Signing(format!("parent key invalid: {e}")))?;

        let child_index = if hardened { index | HARDENED } else { index };

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| WalletError::Signing(format!("hmac init: {e}")))?;
        if hardened {
            mac.update(&[0u8]);
            mac.update(&self.secret);
        } else {
            mac.update(&PublicKey::from_secret_key(&secp, &parent).serialize());
        }
        mac.update(&child_index.to_be_bytes());

        let mut output = mac.finalize().into_bytes();
        let (il, ir) = output.split_at(32);

        let tweak_bytes: [u8; 32] = il.try_into().map_err(|_| {
            WalletError::Signing("hmac output shorter than 64 bytes".into())
        })?;
        let tweak = Scalar::from_be_bytes(tweak_bytes)
            .map_err(|e| WalletError::Signing(format!("child tweak out of range: {e}")))?;
        let child = parent
            .add_tweak(&tweak)
            .map_err(|e| WalletError::Signing(format!("child key derivation: {e}")))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        let keypair = Keypair::from_secret_key(&secp, &child);
        let (xonly, _parity) = XOnlyPublicKey::from_keypair(&keypair);

        let node = DerivedKey {
            secret: child.secret_bytes(),
            chain_code,
            public: xonly.serialize(),
        };
        output.as_mut_slice().zeroize();
        Ok(node)
    }
}

/// Master node from the 64-byte seed.
pub fn master_key(seed: &Seed) -> Result<DerivedKey> {
    let mut mac = HmacSha512::new_from_slice(MASTER_HMAC_KEY)
        .map_err(|e| WalletError::Signing(format!("hmac init: {e}")))?;
    mac.update(seed.as_bytes());
    let mut output = mac.finalize().into_bytes();
    let (il, ir) = output.split_at(32);

    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(il)
        .map_err(|e| WalletError::Signing(format!("master key invalid: {e}")))?;
    let keypair = Keypair::from_secret_key(&secp, &sk);
    let (xonly, _parity) = XOnlyPublicKey::from_keypair(&keypair);

    let mut secret = [0u8; 32];
    secret.copy_from_slice(il);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(ir);

    let node = DerivedKey {
        secret,
        chain_code,
        public: xonly.serialize(),
    };
    output.as_mut_slice().zeroize();
    Ok(node)
}

/// Derive the key at `44'/2400'/account'/role/index`.
pub fn derive_key(seed: &Seed, account: u32, role: Role, index: u32) -> Result<DerivedKey> {
    let mut master = master_key(seed)?;
    let mut purpose = master.derive_child(PURPOSE, true)?;
    master.clear();
    let mut coin = purpose.derive_child(COIN_TYPE, true)?;
    purpose.clear();
    let mut acct = coin.derive_child(account, true)?;
    coin.clear();
    let mut role_node = acct.derive_child(role.index(), false)?;
    acct.clear();
    let leaf = role_node.derive_child(index, false)?;
    role_node.clear();
    Ok(leaf)
}
