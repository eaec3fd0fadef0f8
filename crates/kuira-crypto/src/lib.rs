//! Key material for the kuira wallet core.
//!
//! Flow: mnemonic → 64-byte seed → hardened derivation along
//! `44'/2400'/account'/role/index` → per-role signing / shielded keys.
//!
//! Every secret-bearing container in this crate zeroizes its memory on drop,
//! including error and early-return paths.

pub mod address;
pub mod hd;
pub mod mnemonic;
pub mod schnorr;
pub mod shielded;

pub use hd::{DerivedKey, Role};
pub use mnemonic::Seed;
pub use shielded::ShieldedKeys;
