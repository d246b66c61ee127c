//! Creator withdrawals.
//!
//! The entitlement is read before submission and the pre-read amount is what
//! lands in the ledger — re-querying after confirmation could race a second
//! withdrawal and record the wrong figure. A zero entitlement is rejected
//! before any chain write, since submitting a guaranteed revert only burns
//! gas.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::abi;
use crate::cache;
use crate::chain::ChainReader;
use crate::errors::{OrchestratorError, Result};
use crate::guard::{ActionKind, InFlightRegistry};
use crate::wallet::{self, CallRequest, Wallet};

/// What the creator can take out right now, and everything they have earned
/// over the campaign's lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub withdrawable_amount: u128,
    pub total_earned: u128,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WithdrawOutcome {
    Confirmed { tx_hash: String, amount: u128 },
    AlreadyInFlight,
}

pub struct WithdrawalEngine {
    pool: SqlitePool,
    reader: Arc<ChainReader>,
    wallet: Arc<dyn Wallet>,
    guards: Arc<InFlightRegistry>,
    confirm_interval: Duration,
    confirm_attempts: u32,
}

impl WithdrawalEngine {
    pub fn new(
        pool: SqlitePool,
        reader: Arc<ChainReader>,
        wallet: Arc<dyn Wallet>,
        guards: Arc<InFlightRegistry>,
        confirm_interval: Duration,
        confirm_attempts: u32,
    ) -> Self {
        Self {
            pool,
            reader,
            wallet,
            guards,
            confirm_interval,
            confirm_attempts,
        }
    }

    pub async fn entitlement(&self, campaign: &str) -> Result<Entitlement> {
        self.reader.ensure_deployed(campaign).await?;
        let (withdrawable, earned) = tokio::join!(
            self.reader
                .read_u128(campaign, abi::WITHDRAWAL_AMOUNT, "withdrawalAmount"),
            self.reader
                .read_u128(campaign, abi::TOTAL_EARNED_BY_CREATOR, "totalEarnedByCreator"),
        );
        Ok(Entitlement {
            withdrawable_amount: withdrawable?,
            total_earned: earned?,
        })
    }

    pub async fn withdraw(&self, campaign: &str, creator: &str) -> Result<WithdrawOutcome> {
        if !self.guards.try_acquire(creator, campaign, ActionKind::Withdraw) {
            return Ok(WithdrawOutcome::AlreadyInFlight);
        }
        let result = self.withdraw_inner(campaign, creator).await;
        self.guards.release(creator, campaign, ActionKind::Withdraw);
        result
    }

    async fn withdraw_inner(&self, campaign: &str, creator: &str) -> Result<WithdrawOutcome> {
        cache::get_campaign(&self.pool, campaign)
            .await?
            .ok_or_else(|| OrchestratorError::CampaignNotFound(campaign.to_string()))?;

        let entitlement = self.entitlement(campaign).await?;
        if entitlement.withdrawable_amount == 0 {
            return Err(OrchestratorError::NothingToWithdraw);
        }

        let request = CallRequest {
            from: creator.to_string(),
            to: campaign.to_string(),
            data: abi::calldata(abi::WITHDRAW_CREATORS_FUNDS, &[]),
            value: 0,
        };
        let tx_hash = self.wallet.submit(&request).await?;
        info!(
            "Withdrawal of {} submitted for {creator} on {campaign}: {tx_hash}",
            entitlement.withdrawable_amount
        );

        let receipt = wallet::wait_for_receipt(
            &self.reader.transport(),
            &tx_hash,
            self.confirm_interval,
            self.confirm_attempts,
        )
        .await?;

        // Ledger entry carries the amount read before submission.
        cache::insert_withdrawal(
            &self.pool,
            campaign,
            creator,
            entitlement.withdrawable_amount,
            &tx_hash,
            receipt.block(),
        )
        .await?;

        Ok(WithdrawOutcome::Confirmed {
            tx_hash,
            amount: entitlement.withdrawable_amount,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
