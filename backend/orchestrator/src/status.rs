//! Status reconciliation — derives the canonical campaign status from
//! on-chain counters and keeps the cache converged.
//!
//! The derivation itself is a pure function; the reconciler wraps it with
//! chain reads, a single-shot cache update per transition, and a broadcast
//! channel for observers. A failed chain read falls back to the cached
//! status and never overwrites the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache;
use crate::campaign::CampaignStatus;
use crate::chain::ChainReader;
use crate::errors::{OrchestratorError, Result};

/// Canonical status rule. The terminal check is deferred until the deadline
/// has actually passed — a campaign is never Successful or Failed while
/// `now <= deadline`.
pub fn derive_status(
    total_ever_minted: u64,
    min_required_sales: u64,
    deadline: i64,
    now: i64,
) -> CampaignStatus {
    let has_ended = now > deadline;
    if !has_ended {
        return CampaignStatus::Live;
    }
    if total_ever_minted >= min_required_sales {
        CampaignStatus::Successful
    } else {
        CampaignStatus::Failed
    }
}

/// Emitted once per observed status transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub contract_address: String,
    pub previous: CampaignStatus,
    pub current: CampaignStatus,
}

pub struct StatusReconciler {
    pool: SqlitePool,
    reader: Arc<ChainReader>,
    interval: Duration,
    notify: broadcast::Sender<StatusChange>,
}

/// Handle for one attached observer; dropping the campaign's polling loop
/// is explicit via [`WatchHandle::detach`].
pub struct WatchHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WatchHandle {
    pub fn detach(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl StatusReconciler {
    pub fn new(pool: SqlitePool, reader: Arc<ChainReader>, interval: Duration) -> Arc<Self> {
        let (notify, _) = broadcast::channel(64);
        Arc::new(Self {
            pool,
            reader,
            interval,
            notify,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.notify.subscribe()
    }

    /// Evaluate one campaign: read counters, derive, and reconcile the cache.
    ///
    /// Exactly one cache update and one notification are issued per
    /// transition; re-evaluating an unchanged campaign is a no-op.
    pub async fn evaluate(&self, contract_address: &str) -> Result<CampaignStatus> {
        let record = cache::get_campaign(&self.pool, contract_address)
            .await?
            .ok_or_else(|| OrchestratorError::CampaignNotFound(contract_address.to_string()))?;

        let cached = record.status();
        if cached.is_terminal() {
            return Ok(cached);
        }

        let snapshot = self.reader.snapshot(&record).await;

        // The mint counter is the input that actually moves; when its read
        // failed we have learned nothing and must not touch the cache.
        if snapshot.total_ever_minted.is_stale() {
            return Ok(cached);
        }

        cache::record_minted(&self.pool, contract_address, snapshot.total_ever_minted.value)
            .await?;

        let derived = derive_status(
            snapshot.total_ever_minted.value,
            snapshot.min_required_sales.value,
            snapshot.deadline.value,
            Utc::now().timestamp(),
        );

        if derived != cached {
            cache::update_status(&self.pool, contract_address, derived).await?;
            info!(
                "Campaign {contract_address} transitioned {} → {}",
                cached.as_str(),
                derived.as_str()
            );
            let _ = self.notify.send(StatusChange {
                contract_address: contract_address.to_string(),
                previous: cached,
                current: derived,
            });
        }

        Ok(derived)
    }

    /// Start polling one campaign. Evaluates once immediately, then on the
    /// configured cadence until the handle is detached.
    pub fn attach(self: &Arc<Self>, contract_address: String) -> WatchHandle {
        let reconciler = Arc::clone(self);
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = reconciler.evaluate(&contract_address).await {
                    error!("Status evaluation for {contract_address} failed: {e}");
                }
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(reconciler.interval) => {}
                }
            }
        });
        WatchHandle { token, handle }
    }

    /// Background sweep over every non-terminal campaign; used by the
    /// service entry point.
    pub async fn run_all(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Status reconciler sweeping every {}s",
            self.interval.as_secs()
        );
        loop {
            match cache::live_campaigns(&self.pool).await {
                Ok(campaigns) => {
                    for campaign in campaigns {
                        if let Err(e) = self.evaluate(&campaign.contract_address).await {
                            error!(
                                "Status evaluation for {} failed: {e}",
                                campaign.contract_address
                            );
                        }
                    }
                }
                Err(e) => error!("Could not list campaigns for reconciliation: {e}"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
