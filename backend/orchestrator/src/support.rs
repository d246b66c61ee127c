//! Support (mint) orchestration.
//!
//! Sequences the two-phase approve → mint flow as an explicit state machine:
//! Idle → CheckingApproval → {NeedsApproval | Submitting} →
//! AwaitingConfirmation → {Confirmed | Failed} → Idle.  The NeedsApproval
//! branch is a deliberate external re-entry point — after the supporter has
//! signed the approval the caller invokes [`SupportOrchestrator::support`]
//! again; nothing resumes implicitly.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::abi;
use crate::allowance::{self, AllowanceCheck, ApprovalDescriptor};
use crate::cache;
use crate::chain::ChainReader;
use crate::errors::{OrchestratorError, Result};
use crate::guard::{ActionKind, InFlightRegistry};
use crate::status::StatusReconciler;
use crate::wallet::{self, CallRequest, Wallet};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SupportOutcome {
    /// Mint mined successfully.
    Confirmed { tx_hash: String },
    /// The supporter must sign an approval first, then call `support` again.
    NeedsApproval { approval: ApprovalDescriptor },
    /// A support for this (actor, campaign) is already in flight. Not an
    /// error — duplicate gestures are dropped silently.
    AlreadyInFlight,
}

pub struct SupportOrchestrator {
    pool: SqlitePool,
    reader: Arc<ChainReader>,
    wallet: Arc<dyn Wallet>,
    guards: Arc<InFlightRegistry>,
    reconciler: Arc<StatusReconciler>,
    confirm_interval: Duration,
    confirm_attempts: u32,
}

impl SupportOrchestrator {
    pub fn new(
        pool: SqlitePool,
        reader: Arc<ChainReader>,
        wallet: Arc<dyn Wallet>,
        guards: Arc<InFlightRegistry>,
        reconciler: Arc<StatusReconciler>,
        confirm_interval: Duration,
        confirm_attempts: u32,
    ) -> Self {
        Self {
            pool,
            reader,
            wallet,
            guards,
            reconciler,
            confirm_interval,
            confirm_attempts,
        }
    }

    /// The exact spend a mint costs right now: current bonding-curve price
    /// plus the platform fee. Read live on every call — approval amounts
    /// must never be computed from stale state.
    pub async fn required_spend(&self, campaign: &str) -> Result<u128> {
        let price = self
            .reader
            .read_u128(campaign, abi::CURRENT_PRICE_TO_MINT, "getCurrentPriceToMint")
            .await?;
        let (fee_bps, _treasury) = self.reader.platform_fee(campaign).await?;
        price
            .checked_mul(fee_bps)
            .map(|fee| fee / 10_000)
            .and_then(|fee| price.checked_add(fee))
            .ok_or_else(|| OrchestratorError::Decode("Fee arithmetic overflow".to_string()))
    }

    pub async fn support(&self, campaign: &str, actor: &str) -> Result<SupportOutcome> {
        if !self.guards.try_acquire(actor, campaign, ActionKind::Support) {
            return Ok(SupportOutcome::AlreadyInFlight);
        }
        let result = self.support_inner(campaign, actor).await;
        // Every exit — confirmed, needs-approval, or failure — retires the
        // guard; NeedsApproval must leave the actor free to re-enter.
        self.guards.release(actor, campaign, ActionKind::Support);
        result
    }

    async fn support_inner(&self, campaign: &str, actor: &str) -> Result<SupportOutcome> {
        let record = cache::get_campaign(&self.pool, campaign)
            .await?
            .ok_or_else(|| OrchestratorError::CampaignNotFound(campaign.to_string()))?;

        // Write path: a missing contract is a hard error, not a fallback.
        self.reader.ensure_deployed(campaign).await?;

        let required = self.required_spend(campaign).await?;

        // The payment token is immutable, so the cached value is an
        // acceptable stand-in if the read degrades.
        let payment_token = match self
            .reader
            .read_address(campaign, abi::PAYMENT_TOKEN, "paymentToken")
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!("paymentToken read failed for {campaign}, using cached: {e}");
                record.payment_token.clone()
            }
        };

        if let AllowanceCheck::NeedsApproval(approval) =
            allowance::check_allowance(&self.reader, &payment_token, actor, campaign, required)
                .await?
        {
            debug!("Support for {actor} on {campaign} needs approval of {}", approval.amount);
            return Ok(SupportOutcome::NeedsApproval { approval });
        }

        let native = payment_token == abi::NATIVE_TOKEN;
        let request = CallRequest {
            from: actor.to_string(),
            to: campaign.to_string(),
            data: abi::calldata(abi::MINT, &[]),
            value: if native { required } else { 0 },
        };

        let tx_hash = self.wallet.submit(&request).await?;
        info!("Mint submitted for {actor} on {campaign}: {tx_hash}");

        wallet::wait_for_receipt(
            &self.reader.transport(),
            &tx_hash,
            self.confirm_interval,
            self.confirm_attempts,
        )
        .await?;

        // The mint moved totalEverMinted; fold it back into the cache.
        if let Err(e) = self.reconciler.evaluate(campaign).await {
            warn!("Post-mint reconciliation for {campaign} failed: {e}");
        }

        Ok(SupportOutcome::Confirmed { tx_hash })
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
