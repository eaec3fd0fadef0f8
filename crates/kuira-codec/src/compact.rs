//! Little-endian variable-length integer encoding.
//!
//! Four modes selected by the low two bits of the first byte:
//!   0b00 — single byte, value < 2^6
//!   0b01 — two bytes, value < 2^14
//!   0b10 — four bytes, value < 2^30
//!   0b11 — big-integer: (byte count − 4) in the upper six bits, then that
//!          many little-endian value bytes

use kuira_types::{Result, WalletError};

/// Append the compact encoding of `value`.
pub fn write_compact(out: &mut Vec<u8>, value: u128) {
    if value < 1 << 6 {
        out.push((value as u8) << 2);
    } else if value < 1 << 14 {
        out.extend_from_slice(&(((value as u16) << 2) | 0b01).to_le_bytes());
    } else if value < 1 << 30 {
        out.extend_from_slice(&(((value as u32) << 2) | 0b10).to_le_bytes());
    } else {
        let le = value.to_le_bytes();
        let len = 16 - value.leading_zeros() as usize / 8;
        out.push(0b11 | (((len - 4) as u8) << 2));
        out.extend_from_slice(&le[..len]);
    }
}

/// Byte length of the compact encoding of `value`.
pub fn compact_len(value: u128) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 30 {
        4
    } else {
        1 + (16 - value.leading_zeros() as usize / 8)
    }
}

/// Decode a compact integer; returns (value, bytes consumed).
pub fn read_compact(bytes: &[u8]) -> Result<(u128, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| WalletError::Encoding("empty compact".into()))?;
    match first & 0b11 {
        0b00 => Ok(((first >> 2) as u128, 1)),
        0b01 => {
            if bytes.len() < 2 {
                return Err(WalletError::Encoding("truncated compact u16".into()));
            }
            let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
            Ok(((raw >> 2) as u128, 2))
        }
        0b10 => {
            if bytes.len() < 4 {
                return Err(WalletError::Encoding("truncated compact u32".into()));
            }
            let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok(((raw >> 2) as u128, 4))
        }
        _ => {
            let len = ((first >> 2) as usize) + 4;
            if len > 16 {
                return Err(WalletError::Encoding(format!(
                    "compact big-integer of {len} bytes unsupported"
                )));
            }
            if bytes.len() < 1 + len {
                return Err(WalletError::Encoding("truncated compact big-integer".into()));
            }
            let mut le = [0u8; 16];
            le[..len].copy_from_slice(&bytes[1..1 + len]);
            Ok((u128::from_le_bytes(le), 1 + len))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_at_mode_boundaries() {
        let cases: [u128; 12] = [
            0,
            1,
            63,
            64,
            16_383,
            16_384,
            (1 << 30) - 1,
            1 << 30,
            u32::MAX as u128,
            u64::MAX as u128,
            1_000_000,
            u128::MAX,
        ];
        for value in cases {
            let mut out = Vec::new();
            write_compact(&mut out, value);
            assert_eq!(out.len(), compact_len(value), "len mismatch for {value}");
            let (back, consumed) = read_compact(&out).unwrap();
            assert_eq!(back, value);
            assert_eq!(consumed, out.len());
        }
    }

    #[test]
    fn known_single_byte_forms() {
        let mut out = Vec::new();
        write_compact(&mut out, 0);
        assert_eq!(out, vec![0x00]);
        out.clear();
        write_compact(&mut out, 1);
        assert_eq!(out, vec![0x04]);
        out.clear();
        write_compact(&mut out, 42);
        assert_eq!(out, vec![0xa8]);
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(read_compact(&[]).is_err());
        let mut out = Vec::new();
        write_compact(&mut out, 1_000_000);
        out.truncate(2);
        assert!(read_compact(&out).is_err());
    }
}
