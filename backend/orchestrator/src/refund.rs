//! Supporter refunds for failed campaigns.
//!
//! Enumerating an actor's refundable tokens is a chain walk — ownership
//! count, then token-by-index, then holder detail — and every step is a
//! separate RPC call that retries independently. Claims are guarded per
//! token: a token cannot be double-submitted while its previous claim is
//! still confirming, but the actor's other tokens stay claimable
//! concurrently.

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

/// One NFT receipt and the gross amount its refund returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundableToken {
    pub token_id: u64,
    pub gross_amount: u128,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    Confirmed {
        tx_hash: String,
        token_id: u64,
        amount: u128,
    },
    AlreadyInFlight,
}

pub struct RefundEngine {
    pool: SqlitePool,
    reader: Arc<ChainReader>,
    wallet: Arc<dyn Wallet>,
    guards: Arc<InFlightRegistry>,
    confirm_interval: Duration,
    confirm_attempts: u32,
}

impl RefundEngine {
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

    /// Every token `owner` holds on the campaign, with its refundable gross
    /// amount, in ownership-index order.
    pub async fn list_refundable(&self, campaign: &str, owner: &str) -> Result<Vec<RefundableToken>> {
        self.reader.ensure_deployed(campaign).await?;

        let count = self.reader.nft_balance(campaign, owner).await?;
        let mut tokens = Vec::with_capacity(count as usize);
        for index in 0..count {
            let token_id = self
                .reader
                .token_of_owner_by_index(campaign, owner, index)
                .await?;
            let (_holder, gross_amount) = self.reader.holder_detail(campaign, token_id).await?;
            tokens.push(RefundableToken {
                token_id,
                gross_amount,
            });
        }
        Ok(tokens)
    }

    pub async fn claim_refund(
        &self,
        campaign: &str,
        owner: &str,
        token_id: u64,
    ) -> Result<RefundOutcome> {
        if !self
            .guards
            .try_acquire(owner, campaign, ActionKind::Refund(token_id))
        {
            return Ok(RefundOutcome::AlreadyInFlight);
        }
        let result = self.claim_inner(campaign, owner, token_id).await;
        self.guards
            .release(owner, campaign, ActionKind::Refund(token_id));
        result
    }

    async fn claim_inner(&self, campaign: &str, owner: &str, token_id: u64) -> Result<RefundOutcome> {
        cache::get_campaign(&self.pool, campaign)
            .await?
            .ok_or_else(|| OrchestratorError::CampaignNotFound(campaign.to_string()))?;

        self.reader.ensure_deployed(campaign).await?;

        // Pre-read the gross amount — it is what the ledger will carry.
        let (_holder, gross_amount) = self.reader.holder_detail(campaign, token_id).await?;
        if gross_amount == 0 {
            return Err(OrchestratorError::NoTokensToRefund);
        }

        let request = CallRequest {
            from: owner.to_string(),
            to: campaign.to_string(),
            data: abi::calldata(abi::CLAIM_REFUND, &[abi::encode_uint(token_id as u128)]),
            value: 0,
        };
        let tx_hash = self.wallet.submit(&request).await?;
        info!("Refund claim for token {token_id} submitted by {owner} on {campaign}: {tx_hash}");

        let receipt = wallet::wait_for_receipt(
            &self.reader.transport(),
            &tx_hash,
            self.confirm_interval,
            self.confirm_attempts,
        )
        .await?;

        cache::insert_refund(
            &self.pool,
            campaign,
            owner,
            token_id,
            gross_amount,
            &tx_hash,
            receipt.block(),
        )
        .await?;

        Ok(RefundOutcome::Confirmed {
            tx_hash,
            token_id,
            amount: gross_amount,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
