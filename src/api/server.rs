//! API Server Module
//!
//! Application state, router assembly and server startup.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use super::middleware::{
    create_rate_limiter, rate_limit_middleware, request_logging_middleware, security_headers_middleware,
    webhook_auth_middleware, RateLimitConfig, RateLimitState,
};
use super::routes::{health, stake, status, unstake, webhook};
use crate::common::error::StakeVaultError;
use crate::logging::log_system_event;
use crate::settlement::SharedEngine;

/// State shared by all handlers
pub struct AppState {
    pub engine: SharedEngine,
    /// Guards the user-facing write endpoints
    pub rate_limiter: RateLimitState,
    /// Expected `Authorization` value on webhook deliveries
    pub webhook_secret: Option<String>,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(engine: SharedEngine, webhook_secret: Option<String>) -> SharedAppState {
        Self::with_rate_limit(engine, webhook_secret, RateLimitConfig::default())
    }

    pub fn with_rate_limit(
        engine: SharedEngine,
        webhook_secret: Option<String>,
        config: RateLimitConfig,
    ) -> SharedAppState {
        Arc::new(Self {
            engine,
            rate_limiter: create_rate_limiter(config),
            webhook_secret,
        })
    }
}

/// Build the HTTP router
pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let rate_limited = Router::new()
        .route("/stake-init", post(stake::handle_stake_init))
        .route("/unstake", post(unstake::handle_unstake))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let webhook = Router::new()
        .route("/deposit-webhook", post(webhook::handle_deposit_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), webhook_auth_middleware));

    Router::new()
        .route("/transactions/status/:id", get(status::handle_get_status))
        .route("/transactions/status", get(status::handle_list_history))
        .route("/transactions/unresolved", get(status::handle_unresolved))
        .route("/vault", get(status::handle_vault))
        .route("/health", get(health::handle_health))
        .merge(rate_limited)
        .merge(webhook)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until shutdown
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), StakeVaultError> {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log_system_event("api_listening", serde_json::json!({ "addr": addr }));
    tracing::info!(target: "stakevault::api", "  POST /stake-init                - Create a stake intent");
    tracing::info!(target: "stakevault::api", "  POST /deposit-webhook           - Reconcile observed deposits");
    tracing::info!(target: "stakevault::api", "  POST /unstake                   - Prepare or submit an unstake");
    tracing::info!(target: "stakevault::api", "  GET  /transactions/status/:id   - Intent status");
    tracing::info!(target: "stakevault::api", "  GET  /transactions/status?user= - Recent intents for a wallet");
    tracing::info!(target: "stakevault::api", "  GET  /transactions/unresolved   - Intents needing an operator");
    tracing::info!(target: "stakevault::api", "  GET  /vault                     - Vault totals");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event("api_stopped", serde_json::json!({}));
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "stakevault::system", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
