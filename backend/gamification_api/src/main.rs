//! Gamification API entry point.
//!
//! Loads the customer snapshot from SQLite, then exposes the loyalty engine
//! over a small Axum REST API. Every mutating request is applied by the
//! engine and persisted before the response is sent.

mod api;
mod config;
mod db;
mod errors;
mod service;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use gamification_engine::Engine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use service::SnapshotService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let engine_config = config
        .engine_config()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let engine = Engine::new(engine_config);
    let service = SnapshotService::load(pool, config.storage_key.clone(), engine).await;
    let api_state = Arc::new(api::ApiState {
        service: Arc::new(service),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/dashboard", get(api::get_dashboard))
        .route("/consumption", post(api::record_consumption))
        .route("/invoices/pay", post(api::pay_invoice))
        .route("/referrals/share", post(api::share_code))
        .route("/challenges/refresh", post(api::refresh))
        .route("/challenges/:id/enroll", post(api::enroll_challenge))
        .route("/discounts/redeem", post(api::redeem_discount))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
