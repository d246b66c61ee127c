//! Application-wide error types.
//!
//! Read-path failures (`NotDeployed`, `ReadReverted`, `Exhausted`, `Timeout`)
//! are absorbed by the snapshot layer wherever a cached value exists; only
//! write-path failures propagate to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No contract bytecode at the address. Fatal for that address; never retried.
    #[error("No contract code at {0}")]
    NotDeployed(String),

    /// A read call was rejected by the node. Treated as transient and retried.
    #[error("Read reverted: {0}")]
    ReadReverted(String),

    /// Every retry attempt for a read failed.
    #[error("Retries exhausted reading {0}")]
    Exhausted(String),

    /// The overall wall-clock budget for a read sequence elapsed.
    #[error("Read timed out after {0}s")]
    Timeout(u64),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Creator has no withdrawable balance. Business rejection, not a fault.
    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    /// Actor holds no refundable token for the requested claim.
    #[error("No refundable tokens")]
    NoTokensToRefund,

    /// The wallet (or the node holding the key) declined to sign/broadcast.
    #[error("Wallet rejected the transaction: {0}")]
    WalletRejected(String),

    /// The transaction was mined but reverted.
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    /// `createCampaign` confirmed but no creation event could be extracted.
    #[error("Campaign creation event missing from receipt {0}")]
    LaunchEventMissing(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
