//! Transaction submission and confirmation.
//!
//! The [`Wallet`] trait is the signing boundary: the orchestrators build a
//! [`CallRequest`] and hand it over; whoever holds the key (a node account,
//! a signing service, a test double) broadcasts it and returns the hash.
//! Once broadcast, a transaction cannot be cancelled — callers only poll
//! for its receipt.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::abi;
use crate::chain::Transport;
use crate::errors::{OrchestratorError, Result};

/// A write call ready for signing.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub from: String,
    pub to: String,
    pub data: String,
    /// Native value in base units; non-zero only for native-token mints.
    pub value: u128,
}

pub trait Wallet: Send + Sync {
    /// Sign and broadcast. Resolves to the transaction hash once the
    /// transaction is accepted; a declined signature surfaces as
    /// `WalletRejected`.
    fn submit<'a>(&'a self, request: &'a CallRequest) -> BoxFuture<'a, Result<String>>;
}

/// Submits through the node's own account management
/// (`eth_sendTransaction`); the node holds the key.
pub struct RpcWallet {
    transport: Arc<dyn Transport>,
}

impl RpcWallet {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Wallet for RpcWallet {
    fn submit<'a>(&'a self, request: &'a CallRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut tx = json!({
                "from": request.from,
                "to": request.to,
                "data": request.data,
            });
            if request.value > 0 {
                tx["value"] = json!(format!("0x{:x}", request.value));
            }

            let result = self
                .transport
                .request("eth_sendTransaction", json!([tx]))
                .await
                .map_err(|e| OrchestratorError::WalletRejected(e.to_string()))?;

            result
                .as_str()
                .map(String::from)
                .ok_or_else(|| OrchestratorError::Decode("Non-string tx hash".to_string()))
        })
    }
}

// ─────────────────────────────────────────────────────────
// Receipts
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxReceipt {
    pub status: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    pub fn block(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|b| abi::hex_to_u64(b).ok())
    }
}

/// Poll until the transaction is mined. A `0x0` status becomes
/// `TransactionReverted`; transient RPC errors are absorbed and polled
/// through, since the transaction may well be mined regardless.
pub async fn wait_for_receipt(
    transport: &Arc<dyn Transport>,
    tx_hash: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<TxReceipt> {
    let max_polls = max_polls.max(1);
    for attempt in 1..=max_polls {
        match transport
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await
        {
            Ok(value) if value.is_null() => {
                debug!("Receipt for {tx_hash} pending (poll {attempt}/{max_polls})");
            }
            Ok(value) => {
                let receipt: TxReceipt = serde_json::from_value(value)?;
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(OrchestratorError::TransactionReverted(tx_hash.to_string()));
                }
                return Ok(receipt);
            }
            Err(e) => {
                warn!("Receipt poll for {tx_hash} failed (poll {attempt}/{max_polls}): {e}");
            }
        }
        if attempt < max_polls {
            tokio::time::sleep(poll_interval).await;
        }
    }
    Err(OrchestratorError::Timeout(
        poll_interval
            .saturating_mul(max_polls)
            .as_secs()
            .max(1),
    ))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{receipt_json, MockTransport};

    const ACTOR: &str = "0x1111111111111111111111111111111111111111";
    const CAMPAIGN: &str = "0xc0ffee254729296a45a3885639ac7e10f9d54979";

    fn request(value: u128) -> CallRequest {
        CallRequest {
            from: ACTOR.to_string(),
            to: CAMPAIGN.to_string(),
            data: "0x1249c58b".to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn submit_returns_hash() {
        let transport = MockTransport::new();
        transport.always("eth_sendTransaction", Ok(serde_json::json!("0xdeadbeef")));

        let wallet = RpcWallet::new(transport);
        let hash = wallet.submit(&request(0)).await.unwrap();
        assert_eq!(hash, "0xdeadbeef");
    }

    #[tokio::test]
    async fn submit_carries_value_for_native_mints() {
        let transport = MockTransport::new();
        transport.always("eth_sendTransaction", Ok(serde_json::json!("0xdeadbeef")));

        let wallet = RpcWallet::new(Arc::clone(&transport) as Arc<dyn Transport>);
        wallet.submit(&request(1_400_000)).await.unwrap();

        let calls = transport.calls();
        let tx = &calls[0].1[0];
        assert_eq!(tx["value"].as_str().unwrap(), "0x155cc0");
        assert_eq!(tx["from"].as_str().unwrap(), ACTOR);
    }

    #[tokio::test]
    async fn rpc_refusal_maps_to_wallet_rejected() {
        let transport = MockTransport::new();
        transport.push("eth_sendTransaction", Err("user denied".to_string()));

        let wallet = RpcWallet::new(transport);
        let err = wallet.submit(&request(0)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WalletRejected(_)));
    }

    #[tokio::test]
    async fn receipt_poll_waits_through_pending() {
        let transport = MockTransport::new();
        transport.push("eth_getTransactionReceipt", Ok(serde_json::Value::Null));
        transport.push("eth_getTransactionReceipt", Ok(receipt_json(true, 120)));

        let receipt = wait_for_receipt(
            &(transport as Arc<dyn Transport>),
            "0xabc",
            Duration::from_millis(1),
            5,
        )
        .await
        .unwrap();
        assert_eq!(receipt.block(), Some(120));
    }

    #[tokio::test]
    async fn reverted_receipt_is_an_error() {
        let transport = MockTransport::new();
        transport.push("eth_getTransactionReceipt", Ok(receipt_json(false, 121)));

        let err = wait_for_receipt(
            &(transport as Arc<dyn Transport>),
            "0xabc",
            Duration::from_millis(1),
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::TransactionReverted(_)));
    }

    #[tokio::test]
    async fn receipt_polls_bounded() {
        let transport = MockTransport::new();
        transport.always("eth_getTransactionReceipt", Ok(serde_json::Value::Null));

        let err = wait_for_receipt(
            &(Arc::clone(&transport) as Arc<dyn Transport>),
            "0xabc",
            Duration::from_millis(1),
            3,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout(_)));
        assert_eq!(transport.call_count("eth_getTransactionReceipt"), 3);
    }
}
