//! Node extrinsic envelope around the canonical transaction bytes.
//!
//! Layout: `compact(total_len) ‖ 0x04 ‖ 0x05 ‖ 0x00 ‖ compact(tx_len) ‖ tx`.
//! `total_len` covers everything after its own encoding.

use crate::compact::write_compact;

/// Pallet index of the transaction call on the node runtime.
pub const EXTRINSIC_PALLET_BYTE: u8 = 0x04;
/// Call index within the pallet.
pub const EXTRINSIC_CALL_BYTE: u8 = 0x05;
/// Call-variant discriminator. The node runtime defines this byte; it must
/// be reproduced exactly as the reference encoder emits it.
pub const EXTRINSIC_VARIANT_BYTE: u8 = 0x00;

/// Wrap canonical transaction bytes in the node's extrinsic envelope.
pub fn wrap_extrinsic(tx: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(tx.len() + 8);
    body.push(EXTRINSIC_PALLET_BYTE);
    body.push(EXTRINSIC_CALL_BYTE);
    body.push(EXTRINSIC_VARIANT_BYTE);
    write_compact(&mut body, tx.len() as u128);
    body.extend_from_slice(tx);

    let mut out = Vec::with_capacity(body.len() + 4);
    write_compact(&mut out, body.len() as u128);
    out.extend_from_slice(&body);
    out
}
