//! Explicit configuration passed to the core's constructors.
//!
//! There is no hidden global state: every network parameter a component
//! needs arrives through `NetworkConfig`.

use serde::{Deserialize, Serialize};

/// Which network the wallet talks to. Selects the address HRP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkId {
    Mainnet,
    Testnet,
    Devnet,
}

impl NetworkId {
    /// Human-readable prefix for unshielded addresses on this network.
    /// Mainnet uses the bare family prefix.
    pub fn address_hrp(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "mn_addr",
            NetworkId::Testnet => "mn_addr_testnet",
            NetworkId::Devnet => "mn_addr_dev",
        }
    }
}

/// Dust generation parameters. Network constants; the defaults are the
/// reference values and the embedding application is expected to override
/// them with values fetched from the node at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustParameters {
    /// Specks of dust capacity per Night unit of backing.
    pub night_dust_ratio: u64,
    /// Specks generated per Night unit per second.
    pub generation_decay_rate: u32,
    /// Tolerated skew between a spend's wall-clock time and the replayed
    /// chain time, seconds.
    pub dust_grace_period_secs: u64,
}

impl Default for DustParameters {
    fn default() -> Self {
        Self {
            // 5 dust per Night.
            night_dust_ratio: 5_000_000_000,
            // Works out to a full generation time of roughly one week.
            generation_decay_rate: 8_267,
            // 3 hours.
            dust_grace_period_secs: 3 * 60 * 60,
        }
    }
}

/// All network parameters the core requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: NetworkId,
    pub node_url: String,
    pub indexer_url: String,
    /// Fee rate: Specks per encoded byte.
    pub specks_per_byte: u128,
    pub dust: DustParameters,
    /// Per-request node RPC timeout.
    pub node_timeout_ms: u64,
    /// Total submission confirmation window.
    pub confirmation_timeout_ms: u64,
    /// Pinned version of the shielded/proving backend. Snapshots record it;
    /// a drift surfaces `DerivationMismatch` instead of changed bytes.
    pub backend_version: String,
}

impl NetworkConfig {
    /// Reference defaults for a given network and endpoints.
    pub fn new(network: NetworkId, node_url: &str, indexer_url: &str) -> Self {
        Self {
            network,
            node_url: node_url.to_string(),
            indexer_url: indexer_url.to_string(),
            specks_per_byte: 40,
            dust: DustParameters::default(),
            node_timeout_ms: 30_000,
            confirmation_timeout_ms: 60_000,
            backend_version: "4.0.0".to_string(),
        }
    }
}
