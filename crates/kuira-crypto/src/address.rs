//! Checksummed unshielded address codec.
//!
//! Bech32m (not the older Bech32 checksum) over a 32-byte payload; the
//! payload for an unshielded address is the SHA-256 of the x-only public
//! key. HRP family `mn_addr_<network>`, bare `mn_addr` on mainnet.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use kuira_types::{NetworkId, Result, WalletError};
use sha2::{Digest, Sha256};

fn invalid(reason: impl Into<String>) -> WalletError {
    WalletError::AddressInvalid { reason: reason.into() }
}

/// Encode a 32-byte payload as a bech32m address for the given network.
pub fn encode(network: NetworkId, data: &[u8; 32]) -> Result<String> {
    let hrp = Hrp::parse(network.address_hrp()).map_err(|e| invalid(format!("hrp: {e}")))?;
    bech32::encode::<Bech32m>(hrp, data).map_err(|e| invalid(format!("encode: {e}")))
}

/// Decode a bech32m address string to its network and 32-byte payload.
pub fn decode(s: &str) -> Result<(NetworkId, [u8; 32])> {
    let checked = CheckedHrpstring::new::<Bech32m>(s)
        .map_err(|e| invalid(format!("checksum: {e}")))?;

    let network = match checked.hrp().as_str() {
        "mn_addr" => NetworkId::Mainnet,
        "mn_addr_testnet" => NetworkId::Testnet,
        "mn_addr_dev" => NetworkId::Devnet,
        other => return Err(invalid(format!("unexpected hrp {other:?}"))),
    };

    let bytes: Vec<u8> = checked.byte_iter().collect();
    let data: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| invalid(format!("expected 32-byte payload, got {}", v.len())))?;

    Ok((network, data))
}

/// Address for an x-only public key: bech32m over SHA-256 of the key.
pub fn for_public_key(network: NetworkId, public_key: &[u8; 32]) -> Result<String> {
    let hash: [u8; 32] = Sha256::digest(public_key).into();
    encode(network, &hash)
}

/// Decode and require a specific network, for caller-supplied recipients.
pub fn decode_for_network(s: &str, expected: NetworkId) -> Result<[u8; 32]> {
    let (network, data) = decode(s)?;
    if network != expected {
        return Err(invalid(format!(
            "address network {network:?} does not match wallet network {expected:?}"
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_networks() {
        let payload = [0x3cu8; 32];
        for network in [NetworkId::Mainnet, NetworkId::Testnet, NetworkId::Devnet] {
            let s = encode(network, &payload).unwrap();
            assert!(s.starts_with(network.address_hrp()));
            let (back_net, back) = decode(&s).unwrap();
            assert_eq!(back_net, network);
            assert_eq!(back, payload);
        }
    }

    #[test]
    fn rejects_tampered_checksum() {
        let s = encode(NetworkId::Testnet, &[7u8; 32]).unwrap();
        // Flip the last data character.
        let mut chars: Vec<char> = s.chars().collect();
        let last = *chars.last().unwrap();
        *chars.last_mut().unwrap() = if last == 'q' { 'p' } else { 'q' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            decode(&tampered),
            Err(WalletError::AddressInvalid { .. })
        ));
    }

    #[test]
    fn rejects_foreign_hrp() {
        let hrp = Hrp::parse("bc").unwrap();
        let s = bech32::encode::<Bech32m>(hrp, &[1u8; 32]).unwrap();
        assert!(matches!(decode(&s), Err(WalletError::AddressInvalid { .. })));
    }

    #[test]
    fn rejects_wrong_payload_length() {
        let hrp = Hrp::parse("mn_addr_testnet").unwrap();
        let s = bech32::encode::<Bech32m>(hrp, &[1u8; 20]).unwrap();
        assert!(matches!(decode(&s), Err(WalletError::AddressInvalid { .. })));
    }

    #[test]
    fn network_mismatch_is_rejected() {
        let s = encode(NetworkId::Mainnet, &[9u8; 32]).unwrap();
        assert!(decode_for_network(&s, NetworkId::Testnet).is_err());
        assert_eq!(decode_for_network(&s, NetworkId::Mainnet).unwrap(), [9u8; 32]);
    }

    #[test]
    fn public_key_address_is_hashed() {
        let pk = [0x11u8; 32];
        let s = for_public_key(NetworkId::Testnet, &pk).unwrap();
        let (_, payload) = decode(&s).unwrap();
        let expected: [u8; 32] = Sha256::digest(pk).into();
        assert_eq!(payload, expected);
        assert_ne!(payload, pk);
    }
}
