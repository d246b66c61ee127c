//! Off-chain cache — migrations, campaign rows, and payout ledgers.
//!
//! Writers own disjoint fields: the status reconciler updates `status` and
//! mirrors `total_ever_minted`; the withdrawal/refund engines only append
//! ledger rows. Nothing here read-modify-writes a field another component
//! owns.

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::campaign::{CampaignRecord, CampaignStatus};
use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Campaign rows
// ─────────────────────────────────────────────────────────

/// Parameters for a freshly launched campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub category: String,
    pub creator: String,
    pub min_required_sales: u64,
    pub max_items: u64,
    pub start_price: u128,
    pub price_increment: u128,
    pub payment_token: String,
    pub token_decimals: u8,
    pub deadline: i64,
}

pub async fn insert_campaign(pool: &SqlitePool, campaign: &NewCampaign) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO campaigns
            (contract_address, name, symbol, category, creator,
             min_required_sales, max_items, start_price, price_increment,
             payment_token, token_decimals, deadline, total_ever_minted,
             status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 'LIVE', ?13)
        "#,
    )
    .bind(&campaign.contract_address)
    .bind(&campaign.name)
    .bind(&campaign.symbol)
    .bind(&campaign.category)
    .bind(&campaign.creator)
    .bind(campaign.min_required_sales as i64)
    .bind(campaign.max_items as i64)
    .bind(campaign.start_price.to_string())
    .bind(campaign.price_increment.to_string())
    .bind(&campaign.payment_token)
    .bind(campaign.token_decimals as i64)
    .bind(campaign.deadline)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_campaign(pool: &SqlitePool, contract_address: &str) -> Result<Option<CampaignRecord>> {
    let row = sqlx::query_as::<_, CampaignRecord>(
        "SELECT * FROM campaigns WHERE contract_address = ?1",
    )
    .bind(contract_address)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All campaigns, newest first.
pub async fn list_campaigns(pool: &SqlitePool) -> Result<Vec<CampaignRecord>> {
    let rows = sqlx::query_as::<_, CampaignRecord>(
        "SELECT * FROM campaigns ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Campaigns whose cached status is still non-terminal.
pub async fn live_campaigns(pool: &SqlitePool) -> Result<Vec<CampaignRecord>> {
    let rows = sqlx::query_as::<_, CampaignRecord>(
        "SELECT * FROM campaigns WHERE status = 'LIVE' ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Persist a freshly derived status. Owned exclusively by the reconciler.
pub async fn update_status(
    pool: &SqlitePool,
    contract_address: &str,
    status: CampaignStatus,
) -> Result<()> {
    sqlx::query("UPDATE campaigns SET status = ?2 WHERE contract_address = ?1")
        .bind(contract_address)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Mirror the on-chain mint counter. The guard in the WHERE clause keeps the
/// cached value monotonically non-decreasing even if evaluations interleave.
pub async fn record_minted(pool: &SqlitePool, contract_address: &str, total: u64) -> Result<()> {
    sqlx::query(
        "UPDATE campaigns SET total_ever_minted = ?2
         WHERE contract_address = ?1 AND total_ever_minted < ?2",
    )
    .bind(contract_address)
    .bind(total as i64)
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Payout ledgers
// ─────────────────────────────────────────────────────────

/// An append-only payout row, written only after on-chain confirmation.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub contract_address: String,
    pub actor: String,
    pub amount: String,
    pub tx_hash: String,
    pub block_number: Option<i64>,
    pub created_at: i64,
}

/// Append a withdrawal. Re-submission with the same tx hash is silently
/// ignored, making confirmation handling idempotent.
pub async fn insert_withdrawal(
    pool: &SqlitePool,
    contract_address: &str,
    actor: &str,
    amount: u128,
    tx_hash: &str,
    block_number: Option<u64>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        INSERT OR IGNORE INTO withdrawals
            (contract_address, actor, amount, tx_hash, block_number, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(contract_address)
    .bind(actor)
    .bind(amount.to_string())
    .bind(tx_hash)
    .bind(block_number.map(|b| b as i64))
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Append a refund claim for one token.
pub async fn insert_refund(
    pool: &SqlitePool,
    contract_address: &str,
    actor: &str,
    token_id: u64,
    amount: u128,
    tx_hash: &str,
    block_number: Option<u64>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        INSERT OR IGNORE INTO refunds
            (contract_address, actor, token_id, amount, tx_hash, block_number, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(contract_address)
    .bind(actor)
    .bind(token_id as i64)
    .bind(amount.to_string())
    .bind(tx_hash)
    .bind(block_number.map(|b| b as i64))
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

pub async fn withdrawals_for_campaign(
    pool: &SqlitePool,
    contract_address: &str,
) -> Result<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT id, contract_address, actor, amount, tx_hash, block_number, created_at
        FROM   withdrawals
        WHERE  contract_address = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(contract_address)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// A refund ledger row; like [`LedgerRow`] plus the claimed token.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct RefundRow {
    pub id: i64,
    pub contract_address: String,
    pub actor: String,
    pub token_id: i64,
    pub amount: String,
    pub tx_hash: String,
    pub block_number: Option<i64>,
    pub created_at: i64,
}

pub async fn refunds_for_campaign(
    pool: &SqlitePool,
    contract_address: &str,
) -> Result<Vec<RefundRow>> {
    let rows = sqlx::query_as::<_, RefundRow>(
        r#"
        SELECT id, contract_address, actor, token_id, amount, tx_hash, block_number, created_at
        FROM   refunds
        WHERE  contract_address = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(contract_address)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
