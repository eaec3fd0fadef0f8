//! JSON-RPC 2.0 client for the network node.
//!
//! Raw HTTP POST with serde_json rather than a full RPC framework, to keep
//! the core lean. One method is needed: `author_submitExtrinsic`.

use std::time::Duration;

use async_trait::async_trait;
use kuira_types::{Result, WalletError};
use serde_json::json;
use tracing::debug;

/// Node submission interface; implemented over HTTP here and by scripted
/// doubles in tests.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Submit a framed extrinsic; returns the node's transaction hash.
    async fn submit_extrinsic(&self, extrinsic: &[u8]) -> Result<[u8; 32]>;
}

/// HTTP JSON-RPC node client.
pub struct HttpNodeClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNodeClient {
    pub fn new(url: &str, timeout_ms: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn submit_extrinsic(&self, extrinsic: &[u8]) -> Result<[u8; 32]> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "author_submitExtrinsic",
            "params": [format!("0x{}", hex::encode(extrinsic))],
            "id": 1,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WalletError::NodeTimeout
                } else {
                    WalletError::NodeNetwork(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(WalletError::NodeHttp { status: resp.status().as_u16() });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| WalletError::NodeNetwork(format!("parsing RPC response: {e}")))?;

        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            // 1010 is the node's "invalid transaction" rejection; everything
            // else is a generic RPC failure.
            if code == 1010 {
                return Err(WalletError::TransactionRejected { reason: message });
            }
            return Err(WalletError::NodeRpc { code, message });
        }

        let hash_hex = json
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| WalletError::NodeNetwork("missing result hash".into()))?;
        let hash = kuira_types::hex_to_array32(hash_hex)
            .map_err(|_| WalletError::NodeNetwork(format!("bad result hash {hash_hex:?}")))?;

        debug!(tx_hash = %kuira_types::to_hex(&hash), "extrinsic submitted");
        Ok(hash)
    }
}
