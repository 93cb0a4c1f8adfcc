mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::middleware;
use clap::Parser;
use log::info;
use tower_http::cors::CorsLayer;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::parse();
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));

    state
        .query_service
        .warm_up()
        .await
        .map_err(|e| anyhow::anyhow!("cache warm-up failed: {e}"))?;

    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(tower_http::cors::Any)
        .allow_origin(tower_http::cors::Any);

    let app = routes::router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::require_auth))
        .layer(cors);

    info!("listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl_c handler");
}
