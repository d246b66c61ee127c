//! Presale campaign orchestrator — entry point.
//!
//! Reconciles on-chain campaign state (bonding-curve price, mint counter,
//! deadline) with the off-chain SQLite cache, and drives the wallet-signed
//! transaction flows: approve → mint, creator withdrawal, per-token refund,
//! and factory launch.  A background task keeps every non-terminal
//! campaign's cached status converged; an Axum REST API exposes the
//! reconciled views and the orchestration entry points.

mod abi;
mod allowance;
mod api;
mod cache;
mod campaign;
mod chain;
mod config;
mod errors;
mod guard;
mod launch;
mod refund;
mod status;
mod support;
#[cfg(test)]
mod testutil;
mod wallet;
mod withdraw;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chain::{ChainReader, HttpTransport, Transport};
use config::Config;
use guard::InFlightRegistry;
use launch::CampaignLauncher;
use refund::RefundEngine;
use status::StatusReconciler;
use support::SupportOrchestrator;
use wallet::{RpcWallet, Wallet};
use withdraw::WithdrawalEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // SQLite cache + migrations.
    let pool = cache::init_pool(&config.database_url).await?;

    // One HTTP client behind both the reader and the submitter.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.read_timeout_secs))
        .build()?;
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(client, config.rpc_url.clone()));

    let reader = Arc::new(ChainReader::new(Arc::clone(&transport), &config));
    let signer: Arc<dyn Wallet> = Arc::new(RpcWallet::new(Arc::clone(&transport)));
    let guards = Arc::new(InFlightRegistry::new(Duration::from_millis(
        config.guard_cooldown_ms,
    )));

    let reconciler = StatusReconciler::new(
        pool.clone(),
        Arc::clone(&reader),
        Duration::from_secs(config.poll_interval_secs),
    );

    let confirm_interval = Duration::from_millis(config.confirm_poll_ms);

    let state = Arc::new(api::ApiState {
        pool: pool.clone(),
        reader: Arc::clone(&reader),
        support: SupportOrchestrator::new(
            pool.clone(),
            Arc::clone(&reader),
            Arc::clone(&signer),
            Arc::clone(&guards),
            Arc::clone(&reconciler),
            confirm_interval,
            config.confirm_attempts,
        ),
        withdrawals: WithdrawalEngine::new(
            pool.clone(),
            Arc::clone(&reader),
            Arc::clone(&signer),
            Arc::clone(&guards),
            confirm_interval,
            config.confirm_attempts,
        ),
        refunds: RefundEngine::new(
            pool.clone(),
            Arc::clone(&reader),
            Arc::clone(&signer),
            Arc::clone(&guards),
            confirm_interval,
            config.confirm_attempts,
        ),
        launcher: CampaignLauncher::new(
            pool.clone(),
            Arc::clone(&reader),
            Arc::clone(&signer),
            config.factory_address.clone(),
            confirm_interval,
            config.confirm_attempts,
            config.read_attempts,
        ),
    });

    // ─── Background reconciliation ────────────────────────
    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&reconciler).run_all(shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let app = Router::new()
        .route("/health", get(api::health))
        .route(
            "/campaigns",
            get(api::get_campaigns).post(api::create_campaign),
        )
        .route("/campaigns/:address", get(api::get_campaign))
        .route("/campaigns/:address/support", post(api::support_campaign))
        .route("/campaigns/:address/entitlement", get(api::get_entitlement))
        .route("/campaigns/:address/withdraw", post(api::withdraw))
        .route("/campaigns/:address/withdrawals", get(api::get_withdrawals))
        .route("/campaigns/:address/refundable", get(api::get_refundable))
        .route("/campaigns/:address/refunds", get(api::get_refunds))
        .route(
            "/campaigns/:address/refunds/:token_id",
            post(api::claim_refund),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    shutdown.cancel();
    Ok(())
}
