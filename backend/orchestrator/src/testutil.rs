//! Shared test fixtures — scripted transport, recording wallet, in-memory
//! database. Compiled only for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::cache::NewCampaign;
use crate::campaign::CampaignRecord;
use crate::chain::Transport;
use crate::errors::{OrchestratorError, Result};
use crate::wallet::{CallRequest, Wallet};

type Scripted = std::result::Result<Value, String>;

/// A [`Transport`] that replays scripted responses.
///
/// `eth_call`s are keyed by the 4-byte selector in the calldata so each
/// contract field can be scripted independently; every other method is
/// keyed by name. One-shot responses (`push*`) are consumed in order before
/// the sticky (`always*`) response is used.
pub struct MockTransport {
    delay: Mutex<Duration>,
    one_shot: Mutex<HashMap<String, VecDeque<Scripted>>>,
    sticky: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: Mutex::new(Duration::ZERO),
            one_shot: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, method: &str, response: Scripted) {
        self.one_shot
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn always(&self, method: &str, response: Scripted) {
        self.sticky
            .lock()
            .unwrap()
            .insert(method.to_string(), response);
    }

    pub fn push_call(&self, selector: [u8; 4], response: Scripted) {
        self.push(&Self::call_key(selector), response);
    }

    pub fn always_call(&self, selector: [u8; 4], response: Scripted) {
        self.always(&Self::call_key(selector), response);
    }

    /// Every request made so far, as (method, params).
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Delay every response; used to widen race windows and trip timeouts.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn call_key(selector: [u8; 4]) -> String {
        format!("eth_call:0x{}", hex::encode(selector))
    }

    fn key_for(method: &str, params: &Value) -> String {
        if method == "eth_call" {
            let data = params[0]["data"].as_str().unwrap_or("");
            format!("eth_call:{}", &data[..data.len().min(10)])
        } else {
            method.to_string()
        }
    }
}

impl Transport for MockTransport {
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let delay = *self.delay.lock().unwrap();
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }

            let key = Self::key_for(method, &params);
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));

            if let Some(queue) = self.one_shot.lock().unwrap().get_mut(&key) {
                if let Some(response) = queue.pop_front() {
                    return response.map_err(OrchestratorError::ReadReverted);
                }
            }
            if let Some(response) = self.sticky.lock().unwrap().get(&key) {
                return response.clone().map_err(OrchestratorError::ReadReverted);
            }
            Err(OrchestratorError::ReadReverted(format!(
                "no scripted response for {key}"
            )))
        })
    }
}

/// A [`Wallet`] that records submissions and mints sequential hashes.
pub struct MockWallet {
    delay: Mutex<Duration>,
    submissions: Mutex<Vec<CallRequest>>,
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    counter: AtomicU64,
}

impl MockWallet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: Mutex::new(Duration::ZERO),
            submissions: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            counter: AtomicU64::new(0),
        })
    }

    /// Make the next submission fail as a wallet rejection.
    pub fn reject_next(&self, reason: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    /// Hold each submission open for `delay`; lets tests overlap requests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn submissions(&self) -> Vec<CallRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

impl Wallet for MockWallet {
    fn submit<'a>(&'a self, request: &'a CallRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let delay = *self.delay.lock().unwrap();
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            self.submissions.lock().unwrap().push(request.clone());
            if let Some(response) = self.responses.lock().unwrap().pop_front() {
                return response.map_err(OrchestratorError::WalletRejected);
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("0x{:064x}", 0xaa00 + n))
        })
    }
}

// ─────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────

/// In-memory SQLite with migrations applied. Single connection — every
/// in-memory connection is its own database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub const TEST_PAYMENT_TOKEN: &str = "0x2222222222222222222222222222222222222222";
pub const TEST_CREATOR: &str = "0x1111111111111111111111111111111111111111";

pub fn new_campaign(contract_address: &str) -> NewCampaign {
    NewCampaign {
        contract_address: contract_address.to_string(),
        name: "Solar Farm".to_string(),
        symbol: "SOLAR".to_string(),
        category: "energy".to_string(),
        creator: TEST_CREATOR.to_string(),
        min_required_sales: 10,
        max_items: 100,
        start_price: 1_000_000,
        price_increment: 50_000,
        payment_token: TEST_PAYMENT_TOKEN.to_string(),
        token_decimals: 6,
        deadline: 1_900_000_000,
    }
}

pub fn campaign_record(contract_address: &str) -> CampaignRecord {
    CampaignRecord {
        id: 1,
        contract_address: contract_address.to_string(),
        name: "Solar Farm".to_string(),
        symbol: "SOLAR".to_string(),
        category: "energy".to_string(),
        creator: TEST_CREATOR.to_string(),
        min_required_sales: 10,
        max_items: 100,
        start_price: "1000000".to_string(),
        price_increment: "50000".to_string(),
        payment_token: TEST_PAYMENT_TOKEN.to_string(),
        token_decimals: 6,
        deadline: 1_900_000_000,
        total_ever_minted: 8,
        status: "LIVE".to_string(),
        created_at: 1_700_000_000,
    }
}

/// A uint256 return value as the node would encode it.
pub fn uint_hex(value: u128) -> Value {
    json!(format!("0x{value:064x}"))
}

/// An address return value, right-aligned in one word.
pub fn address_word(address: &str) -> Value {
    json!(format!(
        "0x000000000000000000000000{}",
        address.trim_start_matches("0x")
    ))
}

/// A minimal mined receipt.
pub fn receipt_json(status_ok: bool, block: u64) -> Value {
    json!({
        "status": if status_ok { "0x1" } else { "0x0" },
        "blockNumber": format!("0x{block:x}"),
        "logs": [],
    })
}
