//! Flow402 gateway HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing the gateway's debit,
//! top-up, reset, and balance endpoints.
//!
//! This server includes:
//! - `tracing`-based structured logging
//! - CORS support for cross-origin vendor callers
//! - A Postgres connection pool shared by the tenant registry, idempotency
//!   store, and ledger engine
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `DATABASE_URL`, `HOST`, `PORT`, `FLOW402_TENANT_ID`,
//!   `SIGNATURE_SKEW_SECONDS`, `IDEMPOTENCY_TTL_HOURS`

use std::net::SocketAddr;

use axum::http::Method;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors;

use flow402_gateway::handlers;
use flow402_gateway::idempotency::IdempotencyStore;
use flow402_gateway::state::AppState;
use flow402_gateway::util::SigDown;

use crate::config::Config;

/// Size the store connection pool at expected concurrency x2. Without a
/// configured concurrency target this gateway falls back to a conservative
/// fixed default.
const DEFAULT_POOL_SIZE: u32 = 20;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("Failed to initialize rustls crypto provider");

    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = AppState::new(pool.clone(), config.tenant_id)
        .with_signature_skew_seconds(config.signature_skew_seconds)
        .with_idempotency_store(IdempotencyStore::with_ttl_hours(pool, config.idempotency_ttl_hours));

    let app = handlers::routes(state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
