//! Axum REST API handlers.
//!
//! Read endpoints serve the reconciled snapshot — every degraded field is
//! tagged with its origin so clients can render a staleness indicator.
//! Write endpoints surface orchestration outcomes; duplicate gestures map
//! to 202 with no side effects.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::abi;
use crate::cache;
use crate::campaign::{CampaignRecord, CampaignStatus, Origin, Sourced};
use crate::chain::ChainReader;
use crate::errors::OrchestratorError;
use crate::launch::{CampaignLauncher, CampaignParams};
use crate::refund::{RefundEngine, RefundOutcome};
use crate::status::derive_status;
use crate::support::{SupportOrchestrator, SupportOutcome};
use crate::withdraw::{WithdrawOutcome, WithdrawalEngine};

pub struct ApiState {
    pub pool: SqlitePool,
    pub reader: Arc<ChainReader>,
    pub support: SupportOrchestrator,
    pub withdrawals: WithdrawalEngine,
    pub refunds: RefundEngine,
    pub launcher: CampaignLauncher,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ActorBody {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct CreatorBody {
    pub creator: String,
}

#[derive(Deserialize)]
pub struct OwnerBody {
    pub owner: String,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Deserialize)]
pub struct LaunchBody {
    pub creator: String,
    #[serde(flatten)]
    pub params: CampaignParams,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct PriceView {
    pub base_units: String,
    pub display: String,
    pub origin: Origin,
}

#[derive(Serialize)]
pub struct OnchainView {
    pub total_ever_minted: Sourced<u64>,
    pub min_required_sales: Sourced<u64>,
    pub max_items: Sourced<u64>,
    pub deadline: Sourced<i64>,
    pub current_price: PriceView,
    pub payment_token: Sourced<String>,
}

#[derive(Serialize)]
pub struct CampaignResponse {
    pub campaign: CampaignRecord,
    pub status: CampaignStatus,
    /// False when any field fell back to the cache.
    pub live: bool,
    pub onchain: OnchainView,
}

#[derive(Serialize)]
pub struct CampaignListResponse {
    pub count: usize,
    pub campaigns: Vec<CampaignRecord>,
}

// ─────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────

pub(crate) fn status_for(error: &OrchestratorError) -> StatusCode {
    use OrchestratorError::*;
    match error {
        CampaignNotFound(_) => StatusCode::NOT_FOUND,
        NothingToWithdraw | NoTokensToRefund => StatusCode::CONFLICT,
        WalletRejected(_) | Config(_) => StatusCode::BAD_REQUEST,
        Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        NotDeployed(_) | ReadReverted(_) | Exhausted(_) | Decode(_) | Http(_) | Json(_)
        | TransactionReverted(_) | LaunchEventMissing(_) => StatusCode::BAD_GATEWAY,
        Database(_) | Migrate(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fail(error: OrchestratorError) -> Response {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn bad_address(raw: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("Malformed address: {raw}"),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /campaigns`
pub async fn get_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    match cache::list_campaigns(&state.pool).await {
        Ok(campaigns) => Json(CampaignListResponse {
            count: campaigns.len(),
            campaigns,
        })
        .into_response(),
        Err(e) => fail(e),
    }
}

/// `GET /campaigns/:address`
///
/// The reconciled per-field view. Status is derived from the snapshot when
/// the counter read succeeded, otherwise the cached status is served as-is;
/// cache writes stay with the reconciler's polling loop.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    let record = match cache::get_campaign(&state.pool, &address).await {
        Ok(Some(record)) => record,
        Ok(None) => return fail(OrchestratorError::CampaignNotFound(address)),
        Err(e) => return fail(e),
    };

    let snapshot = state.reader.snapshot(&record).await;
    let status = if snapshot.total_ever_minted.is_stale() {
        record.status()
    } else {
        derive_status(
            snapshot.total_ever_minted.value,
            snapshot.min_required_sales.value,
            snapshot.deadline.value,
            Utc::now().timestamp(),
        )
    };

    let decimals = record.token_decimals.clamp(0, u8::MAX as i64) as u8;
    let response = CampaignResponse {
        status,
        live: snapshot.fully_live(),
        onchain: OnchainView {
            total_ever_minted: snapshot.total_ever_minted,
            min_required_sales: snapshot.min_required_sales,
            max_items: snapshot.max_items,
            deadline: snapshot.deadline,
            current_price: PriceView {
                base_units: snapshot.current_price.value.to_string(),
                display: abi::format_units(snapshot.current_price.value, decimals),
                origin: snapshot.current_price.origin,
            },
            payment_token: snapshot.payment_token.clone(),
        },
        campaign: record,
    };
    Json(response).into_response()
}

/// `POST /campaigns` — launch through the factory.
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<LaunchBody>,
) -> Response {
    let Ok(creator) = abi::normalize_address(&body.creator) else {
        return bad_address(&body.creator);
    };
    match state.launcher.launch(&body.params, &creator).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => fail(e),
    }
}

/// `POST /campaigns/:address/support`
pub async fn support_campaign(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Json(body): Json<ActorBody>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    let Ok(actor) = abi::normalize_address(&body.actor) else {
        return bad_address(&body.actor);
    };
    match state.support.support(&address, &actor).await {
        Ok(outcome @ SupportOutcome::AlreadyInFlight) => {
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => fail(e),
    }
}

/// `GET /campaigns/:address/entitlement`
pub async fn get_entitlement(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    match state.withdrawals.entitlement(&address).await {
        Ok(entitlement) => Json(entitlement).into_response(),
        Err(e) => fail(e),
    }
}

/// `POST /campaigns/:address/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Json(body): Json<CreatorBody>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    let Ok(creator) = abi::normalize_address(&body.creator) else {
        return bad_address(&body.creator);
    };
    match state.withdrawals.withdraw(&address, &creator).await {
        Ok(outcome @ WithdrawOutcome::AlreadyInFlight) => {
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => fail(e),
    }
}

/// `GET /campaigns/:address/withdrawals`
pub async fn get_withdrawals(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    match cache::withdrawals_for_campaign(&state.pool, &address).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => fail(e),
    }
}

/// `GET /campaigns/:address/refundable?owner=0x…`
pub async fn get_refundable(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    let Ok(owner) = abi::normalize_address(&query.owner) else {
        return bad_address(&query.owner);
    };
    match state.refunds.list_refundable(&address, &owner).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => fail(e),
    }
}

/// `GET /campaigns/:address/refunds`
pub async fn get_refunds(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    match cache::refunds_for_campaign(&state.pool, &address).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => fail(e),
    }
}

/// `POST /campaigns/:address/refunds/:token_id`
pub async fn claim_refund(
    State(state): State<Arc<ApiState>>,
    Path((address, token_id)): Path<(String, u64)>,
    Json(body): Json<OwnerBody>,
) -> Response {
    let Ok(address) = abi::normalize_address(&address) else {
        return bad_address(&address);
    };
    let Ok(owner) = abi::normalize_address(&body.owner) else {
        return bad_address(&body.owner);
    };
    match state.refunds.claim_refund(&address, &owner, token_id).await {
        Ok(outcome @ RefundOutcome::AlreadyInFlight) => {
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => fail(e),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
