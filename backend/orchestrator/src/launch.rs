//! Campaign launch through the factory contract.
//!
//! The new campaign's identity exists only in the `CampaignCreated` event of
//! the mined `createCampaign` transaction. If the event cannot be extracted
//! the launch fails loudly with the tx hash for manual reconciliation —
//! persisting a made-up address would poison every later read against it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::abi;
use crate::cache::{self, NewCampaign};
use crate::chain::ChainReader;
use crate::errors::{OrchestratorError, Result};
use crate::wallet::{self, CallRequest, TxReceipt, Wallet};

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignParams {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub category: String,
    pub min_required_sales: u64,
    pub max_items: u64,
    pub start_price: u128,
    pub price_increment: u128,
    pub payment_token: String,
    pub deadline: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutcome {
    pub contract_address: String,
    pub tx_hash: String,
}

pub struct CampaignLauncher {
    pool: SqlitePool,
    reader: Arc<ChainReader>,
    wallet: Arc<dyn Wallet>,
    factory: String,
    confirm_interval: Duration,
    confirm_attempts: u32,
    /// Bounded re-fetches of the receipt when its logs have not surfaced yet.
    receipt_refetches: u32,
}

impl CampaignLauncher {
    pub fn new(
        pool: SqlitePool,
        reader: Arc<ChainReader>,
        wallet: Arc<dyn Wallet>,
        factory: String,
        confirm_interval: Duration,
        confirm_attempts: u32,
        receipt_refetches: u32,
    ) -> Self {
        Self {
            pool,
            reader,
            wallet,
            factory,
            confirm_interval,
            confirm_attempts,
            receipt_refetches,
        }
    }

    pub async fn launch(&self, params: &CampaignParams, creator: &str) -> Result<LaunchOutcome> {
        let data = abi::encode_create_campaign(
            &params.name,
            &params.symbol,
            &params.category,
            params.min_required_sales,
            params.max_items,
            params.start_price,
            params.price_increment,
            &params.payment_token,
            params.deadline,
        )?;

        let request = CallRequest {
            from: creator.to_string(),
            to: self.factory.clone(),
            data,
            value: 0,
        };
        let tx_hash = self.wallet.submit(&request).await?;
        info!("createCampaign submitted by {creator}: {tx_hash}");

        let transport = self.reader.transport();
        let mut receipt = wallet::wait_for_receipt(
            &transport,
            &tx_hash,
            self.confirm_interval,
            self.confirm_attempts,
        )
        .await?;

        let mut contract_address = self.extract_campaign_address(&receipt);
        let mut refetch = 0;
        while contract_address.is_none() && refetch < self.receipt_refetches {
            refetch += 1;
            debug!(
                "CampaignCreated not in receipt yet, refetching ({refetch}/{})",
                self.receipt_refetches
            );
            tokio::time::sleep(self.confirm_interval).await;
            match wallet::wait_for_receipt(&transport, &tx_hash, self.confirm_interval, 1).await {
                Ok(fresh) => {
                    receipt = fresh;
                    contract_address = self.extract_campaign_address(&receipt);
                }
                Err(e) => warn!("Receipt refetch for {tx_hash} failed: {e}"),
            }
        }

        let Some(contract_address) = contract_address else {
            return Err(OrchestratorError::LaunchEventMissing(tx_hash));
        };

        let token_decimals = self.reader.token_decimals(&params.payment_token).await;

        cache::insert_campaign(
            &self.pool,
            &NewCampaign {
                contract_address: contract_address.clone(),
                name: params.name.clone(),
                symbol: params.symbol.clone(),
                category: params.category.clone(),
                creator: creator.to_string(),
                min_required_sales: params.min_required_sales,
                max_items: params.max_items,
                start_price: params.start_price,
                price_increment: params.price_increment,
                payment_token: abi::normalize_address(&params.payment_token)?,
                token_decimals,
                deadline: params.deadline,
            },
        )
        .await?;
        info!("Campaign {contract_address} launched by {creator}");

        Ok(LaunchOutcome {
            contract_address,
            tx_hash,
        })
    }

    /// Find the factory's `CampaignCreated(creator, campaign)` log and pull
    /// the campaign address out of the second indexed topic.
    fn extract_campaign_address(&self, receipt: &TxReceipt) -> Option<String> {
        receipt.logs.iter().find_map(|log| {
            if !log.address.eq_ignore_ascii_case(&self.factory) {
                return None;
            }
            if !log
                .topics
                .first()?
                .eq_ignore_ascii_case(abi::CAMPAIGN_CREATED_TOPIC)
            {
                return None;
            }
            abi::topic_to_address(log.topics.get(2)?).ok()
        })
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
