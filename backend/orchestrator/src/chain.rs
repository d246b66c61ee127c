//! JSON-RPC chain access — transport seam, bounded retry, cache fallback.
//!
//! ## Resilience
//!
//! * A missing contract (`eth_getCode` returns `0x`) is fatal for that
//!   address and short-circuits to the cache fallback with zero retries.
//! * Functional reads retry up to the configured attempt budget with linear
//!   backoff, surfacing `Exhausted` only after every attempt failed.
//! * Each read sequence races an overall wall-clock timeout.
//! * Snapshot fields are read concurrently and degrade to their cached
//!   values independently — one failing field never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::abi;
use crate::campaign::{CampaignRecord, CampaignSnapshot, Sourced};
use crate::config::Config;
use crate::errors::{OrchestratorError, Result};

// ─────────────────────────────────────────────────────────
// Transport seam
// ─────────────────────────────────────────────────────────

/// One JSON-RPC round trip. Production uses [`HttpTransport`]; tests inject
/// scripted responses.
pub trait Transport: Send + Sync {
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, Result<Value>>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

impl Transport for HttpTransport {
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method,
                    "params": params,
                }))
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(OrchestratorError::ReadReverted(
                    "Rate-limited by RPC".to_string(),
                ));
            }

            let body: RpcEnvelope = response.json().await?;
            if let Some(err) = body.error {
                return Err(OrchestratorError::ReadReverted(format!(
                    "RPC error {}: {}",
                    err.code, err.message
                )));
            }
            Ok(body.result.unwrap_or(Value::Null))
        })
    }
}

// ─────────────────────────────────────────────────────────
// ChainReader
// ─────────────────────────────────────────────────────────

pub struct ChainReader {
    transport: Arc<dyn Transport>,
    attempts: u32,
    backoff: Duration,
    overall_timeout: Duration,
}

impl ChainReader {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self::with_policy(
            transport,
            config.read_attempts,
            Duration::from_millis(config.retry_backoff_ms),
            Duration::from_secs(config.read_timeout_secs),
        )
    }

    pub fn with_policy(
        transport: Arc<dyn Transport>,
        attempts: u32,
        backoff: Duration,
        overall_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            attempts: attempts.max(1),
            backoff,
            overall_timeout,
        }
    }

    /// The underlying transport, shared with the wallet/confirmation plumbing.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Verify the address carries deployed bytecode. A bare `0x` is a
    /// distinct, non-transient failure — callers fall back to the cache
    /// immediately instead of burning retries.
    pub async fn ensure_deployed(&self, address: &str) -> Result<()> {
        let code = self
            .transport
            .request("eth_getCode", json!([address, "latest"]))
            .await?;
        match code.as_str() {
            Some(hex) if hex != "0x" && !hex.is_empty() => Ok(()),
            Some(_) => Err(OrchestratorError::NotDeployed(address.to_string())),
            None => Err(OrchestratorError::Decode(
                "Non-string eth_getCode result".to_string(),
            )),
        }
    }

    /// `eth_call` with bounded retry, linear backoff, and an overall
    /// wall-clock budget.
    pub async fn call(&self, to: &str, data: String, label: &str) -> Result<String> {
        let secs = self.overall_timeout.as_secs();
        tokio::time::timeout(self.overall_timeout, self.call_with_retry(to, data, label))
            .await
            .map_err(|_| OrchestratorError::Timeout(secs))?
    }

    async fn call_with_retry(&self, to: &str, data: String, label: &str) -> Result<String> {
        for attempt in 1..=self.attempts {
            let params = json!([{ "to": to, "data": data.as_str() }, "latest"]);
            match self.transport.request("eth_call", params).await {
                Ok(value) => {
                    debug!("{label} read OK on attempt {attempt}");
                    return value.as_str().map(String::from).ok_or_else(|| {
                        OrchestratorError::Decode(format!("Non-string return for {label}"))
                    });
                }
                Err(e) => {
                    warn!(
                        "{label} read failed (attempt {attempt}/{}): {e}",
                        self.attempts
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        Err(OrchestratorError::Exhausted(label.to_string()))
    }

    // ─── Typed field reads ────────────────────────────────

    pub async fn read_u64(&self, contract: &str, selector: [u8; 4], label: &str) -> Result<u64> {
        let data = self.call(contract, abi::calldata(selector, &[]), label).await?;
        abi::word_to_u64(&abi::first_word(&data, label)?)
    }

    pub async fn read_u128(&self, contract: &str, selector: [u8; 4], label: &str) -> Result<u128> {
        let data = self.call(contract, abi::calldata(selector, &[]), label).await?;
        abi::word_to_u128(&abi::first_word(&data, label)?)
    }

    pub async fn read_address(
        &self,
        contract: &str,
        selector: [u8; 4],
        label: &str,
    ) -> Result<String> {
        let data = self.call(contract, abi::calldata(selector, &[]), label).await?;
        Ok(abi::word_to_address(&abi::first_word(&data, label)?))
    }

    pub async fn allowance(&self, token: &str, owner: &str, spender: &str) -> Result<u128> {
        let data = abi::calldata(
            abi::ALLOWANCE,
            &[abi::encode_address(owner)?, abi::encode_address(spender)?],
        );
        let ret = self.call(token, data, "allowance").await?;
        abi::word_to_u128(&abi::first_word(&ret, "allowance")?)
    }

    /// NFT receipt count held by `owner` on the campaign contract.
    pub async fn nft_balance(&self, campaign: &str, owner: &str) -> Result<u64> {
        let data = abi::calldata(abi::BALANCE_OF, &[abi::encode_address(owner)?]);
        let ret = self.call(campaign, data, "balanceOf").await?;
        abi::word_to_u64(&abi::first_word(&ret, "balanceOf")?)
    }

    pub async fn token_of_owner_by_index(
        &self,
        campaign: &str,
        owner: &str,
        index: u64,
    ) -> Result<u64> {
        let data = abi::calldata(
            abi::TOKEN_OF_OWNER_BY_INDEX,
            &[abi::encode_address(owner)?, abi::encode_uint(index as u128)],
        );
        let ret = self.call(campaign, data, "tokenOfOwnerByIndex").await?;
        abi::word_to_u64(&abi::first_word(&ret, "tokenOfOwnerByIndex")?)
    }

    /// `getHolderByTokenId` → (holder address, gross contribution).
    pub async fn holder_detail(&self, campaign: &str, token_id: u64) -> Result<(String, u128)> {
        let data = abi::calldata(abi::HOLDER_BY_TOKEN_ID, &[abi::encode_uint(token_id as u128)]);
        let ret = self.call(campaign, data, "getHolderByTokenId").await?;
        let words = abi::decode_words(&ret)?;
        if words.len() < 2 {
            return Err(OrchestratorError::Decode(
                "getHolderByTokenId returned fewer than two words".to_string(),
            ));
        }
        Ok((abi::word_to_address(&words[0]), abi::word_to_u128(&words[1])?))
    }

    /// `getPlatformFeeAndTreasury` → (fee in basis points, treasury address).
    pub async fn platform_fee(&self, campaign: &str) -> Result<(u128, String)> {
        let ret = self
            .call(
                campaign,
                abi::calldata(abi::PLATFORM_FEE_AND_TREASURY, &[]),
                "getPlatformFeeAndTreasury",
            )
            .await?;
        let words = abi::decode_words(&ret)?;
        if words.len() < 2 {
            return Err(OrchestratorError::Decode(
                "getPlatformFeeAndTreasury returned fewer than two words".to_string(),
            ));
        }
        Ok((abi::word_to_u128(&words[0])?, abi::word_to_address(&words[1])))
    }

    /// ERC-20 `decimals()`, defaulting to 18 when the token does not answer.
    pub async fn token_decimals(&self, token: &str) -> u8 {
        if token == abi::NATIVE_TOKEN {
            return 18;
        }
        match self.read_u64(token, abi::DECIMALS, "decimals").await {
            Ok(d) if d <= u8::MAX as u64 => d as u8,
            Ok(d) => {
                warn!("Implausible decimals {d} from {token}, defaulting to 18");
                18
            }
            Err(e) => {
                warn!("decimals read failed for {token}, defaulting to 18: {e}");
                18
            }
        }
    }

    // ─── Snapshot ─────────────────────────────────────────

    /// Read every display field concurrently, falling back to the cached
    /// record per field. The price fallback is derived from the cached
    /// bonding-curve parameters so a price is always renderable.
    pub async fn snapshot(&self, record: &CampaignRecord) -> CampaignSnapshot {
        let address = record.contract_address.as_str();

        if let Err(e) = self.ensure_deployed(address).await {
            warn!("Snapshot for {address} degraded to cache: {e}");
            return Self::cached_snapshot(record);
        }

        let (total, min, max, deadline, price, token) = tokio::join!(
            self.read_u64(address, abi::TOTAL_EVER_MINTED, "totalEverMinted"),
            self.read_u64(address, abi::MIN_REQUIRED_SALES, "minRequiredSales"),
            self.read_u64(address, abi::MAX_ITEMS, "maxItems"),
            self.read_u64(address, abi::DEADLINE, "deadline"),
            self.read_u128(address, abi::CURRENT_PRICE_TO_MINT, "getCurrentPriceToMint"),
            self.read_address(address, abi::PAYMENT_TOKEN, "paymentToken"),
        );

        let total_ever_minted = Self::fallback(total, record.total_ever_minted.max(0) as u64);
        let current_price = match price {
            Ok(p) => Sourced::chain(p),
            Err(e) => {
                warn!("Price read failed for {address}, deriving from cached curve: {e}");
                Sourced::cache(record.derived_price(total_ever_minted.value))
            }
        };

        CampaignSnapshot {
            contract_address: record.contract_address.clone(),
            total_ever_minted,
            min_required_sales: Self::fallback(min, record.min_required_sales.max(0) as u64),
            max_items: Self::fallback(max, record.max_items.max(0) as u64),
            deadline: Self::fallback(deadline.map(|d| d as i64), record.deadline),
            current_price,
            payment_token: match token {
                Ok(t) => Sourced::chain(t),
                Err(e) => {
                    warn!("paymentToken read failed for {address}: {e}");
                    Sourced::cache(record.payment_token.clone())
                }
            },
        }
    }

    fn cached_snapshot(record: &CampaignRecord) -> CampaignSnapshot {
        let total = record.total_ever_minted.max(0) as u64;
        CampaignSnapshot {
            contract_address: record.contract_address.clone(),
            total_ever_minted: Sourced::cache(total),
            min_required_sales: Sourced::cache(record.min_required_sales.max(0) as u64),
            max_items: Sourced::cache(record.max_items.max(0) as u64),
            deadline: Sourced::cache(record.deadline),
            current_price: Sourced::cache(record.derived_price(total)),
            payment_token: Sourced::cache(record.payment_token.clone()),
        }
    }

    fn fallback<T: Copy>(read: Result<T>, cached: T) -> Sourced<T> {
        match read {
            Ok(v) => Sourced::chain(v),
            Err(_) => Sourced::cache(cached),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::Origin;
    use crate::testutil::{campaign_record, uint_hex, MockTransport};

    const CAMPAIGN: &str = "0xc0ffee254729296a45a3885639ac7e10f9d54979";

    fn reader(transport: Arc<MockTransport>) -> ChainReader {
        ChainReader::with_policy(
            transport,
            3,
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn third_attempt_succeeds_no_fallback() {
        let transport = MockTransport::new();
        transport.always("eth_getCode", Ok(serde_json::json!("0x6080")));
        transport.push_call(abi::TOTAL_EVER_MINTED, Err("boom".to_string()));
        transport.push_call(abi::TOTAL_EVER_MINTED, Err("boom again".to_string()));
        transport.push_call(abi::TOTAL_EVER_MINTED, Ok(uint_hex(42)));

        let reader = reader(Arc::clone(&transport));
        let value = reader
            .read_u64(CAMPAIGN, abi::TOTAL_EVER_MINTED, "totalEverMinted")
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(transport.call_count("eth_call"), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_surfaces_exhausted() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_call(abi::TOTAL_EVER_MINTED, Err("down".to_string()));
        }
        let reader = reader(Arc::clone(&transport));
        let err = reader
            .read_u64(CAMPAIGN, abi::TOTAL_EVER_MINTED, "totalEverMinted")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Exhausted(_)));
        assert_eq!(transport.call_count("eth_call"), 3);
    }

    #[tokio::test]
    async fn missing_bytecode_short_circuits_without_retries() {
        let transport = MockTransport::new();
        transport.always("eth_getCode", Ok(serde_json::json!("0x")));

        let reader = reader(Arc::clone(&transport));
        let err = reader.ensure_deployed(CAMPAIGN).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotDeployed(_)));

        // A degraded snapshot performs zero functional reads.
        let snapshot = reader.snapshot(&campaign_record(CAMPAIGN)).await;
        assert_eq!(transport.call_count("eth_call"), 0);
        assert!(snapshot.total_ever_minted.is_stale());
        assert!(snapshot.current_price.is_stale());
    }

    #[tokio::test]
    async fn failing_field_degrades_alone() {
        let transport = MockTransport::new();
        transport.always("eth_getCode", Ok(serde_json::json!("0x6080")));
        // totalEverMinted fails on all attempts; every other field answers.
        for _ in 0..3 {
            transport.push_call(abi::TOTAL_EVER_MINTED, Err("down".to_string()));
        }
        transport.always_call(abi::MIN_REQUIRED_SALES, Ok(uint_hex(10)));
        transport.always_call(abi::MAX_ITEMS, Ok(uint_hex(100)));
        transport.always_call(abi::DEADLINE, Ok(uint_hex(1_900_000_000)));
        transport.always_call(abi::CURRENT_PRICE_TO_MINT, Ok(uint_hex(1_400_000)));
        transport.always_call(
            abi::PAYMENT_TOKEN,
            Ok(serde_json::json!(format!(
                "0x000000000000000000000000{}",
                "2222222222222222222222222222222222222222"
            ))),
        );

        let record = campaign_record(CAMPAIGN);
        let reader = reader(Arc::clone(&transport));
        let snapshot = reader.snapshot(&record).await;

        assert_eq!(snapshot.total_ever_minted.origin, Origin::Cache);
        assert_eq!(
            snapshot.total_ever_minted.value,
            record.total_ever_minted as u64
        );
        // Unaffected fields keep their freshly read values.
        assert_eq!(snapshot.min_required_sales.value, 10);
        assert_eq!(snapshot.min_required_sales.origin, Origin::Chain);
        assert_eq!(snapshot.deadline.value, 1_900_000_000);
        assert_eq!(snapshot.current_price.value, 1_400_000);
        assert!(!snapshot.fully_live());
    }

    #[tokio::test]
    async fn price_fallback_derives_from_cached_curve() {
        let transport = MockTransport::new();
        transport.always("eth_getCode", Ok(serde_json::json!("0x6080")));
        transport.always_call(abi::TOTAL_EVER_MINTED, Ok(uint_hex(8)));
        transport.always_call(abi::MIN_REQUIRED_SALES, Ok(uint_hex(10)));
        transport.always_call(abi::MAX_ITEMS, Ok(uint_hex(100)));
        transport.always_call(abi::DEADLINE, Ok(uint_hex(1_900_000_000)));
        for _ in 0..3 {
            transport.push_call(abi::CURRENT_PRICE_TO_MINT, Err("down".to_string()));
        }
        transport.always_call(
            abi::PAYMENT_TOKEN,
            Ok(serde_json::json!(format!(
                "0x000000000000000000000000{}",
                "2222222222222222222222222222222222222222"
            ))),
        );

        let record = campaign_record(CAMPAIGN);
        let reader = reader(Arc::clone(&transport));
        let snapshot = reader.snapshot(&record).await;

        // start_price 1_000_000 + 8 × 50_000, from the live total.
        assert_eq!(snapshot.current_price.value, 1_400_000);
        assert_eq!(snapshot.current_price.origin, Origin::Cache);
        assert_eq!(snapshot.total_ever_minted.origin, Origin::Chain);
    }

    #[tokio::test]
    async fn slow_transport_hits_overall_timeout() {
        let transport = MockTransport::new();
        transport.set_delay(Duration::from_millis(50));
        transport.always_call(abi::TOTAL_EVER_MINTED, Ok(uint_hex(1)));

        let reader = ChainReader::with_policy(
            transport,
            3,
            Duration::from_millis(1),
            Duration::from_millis(5),
        );
        let err = reader
            .read_u64(CAMPAIGN, abi::TOTAL_EVER_MINTED, "totalEverMinted")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout(_)));
    }

    #[tokio::test]
    async fn holder_detail_decodes_pair() {
        let transport = MockTransport::new();
        let ret = format!(
            "0x000000000000000000000000{}{:064x}",
            "1111111111111111111111111111111111111111", 5_000u64
        );
        transport.always_call(abi::HOLDER_BY_TOKEN_ID, Ok(serde_json::json!(ret)));

        let reader = reader(transport);
        let (holder, gross) = reader.holder_detail(CAMPAIGN, 7).await.unwrap();
        assert_eq!(holder, "0x1111111111111111111111111111111111111111");
        assert_eq!(gross, 5_000);
    }
}
