mod api;
mod auth;
mod cache;
mod config;
mod errors;
mod identity;
mod oauth2;
mod openapi;
mod permissions;
mod session;
mod state;
mod store;
#[cfg(test)]
mod test_utils;
mod token;

use crate::state::AppState;
use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = match config::SentinelConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Connect backends and wire components
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let (app, _) = create_app(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Create the application router and its OpenAPI document
pub fn create_app(state: AppState) -> (Router, utoipa::openapi::OpenApi) {
    let (router, api_doc) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(api::router(&state))
        .split_for_parts();

    let timeout = Duration::from_secs(state.config.request_timeout);
    let app = router
        .merge(Scalar::with_url("/scalar", api_doc.clone()))
        // Dropping a timed out request also rolls back its open transaction
        .layer(TimeoutLayer::new(timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state);
    (app, api_doc)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
