//! API server for the Issue Pilot runner supervisor
//!
//! REST API plus a Socket.IO push channel for live runner output, both on
//! port 8080.

mod routes;
mod socket;
mod state;

use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runner_supervisor::SupervisorConfig;

use crate::socket::{create_socket_layer, SocketState};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,tower_http=debug,socketioxide=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine data directory
    let data_dir = std::env::var("PILOT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".pilot-data"));

    tracing::info!("Using data directory: {:?}", data_dir);

    let supervisor_config = SupervisorConfig {
        data_dir,
        ..SupervisorConfig::default()
    };

    let app_state = AppState::new(supervisor_config)
        .await
        .expect("Failed to initialize supervisor");

    // Socket.IO layer for live output streaming
    let socket_state = SocketState::new(Arc::clone(app_state.supervisor()));
    let (socket_layer, _io) = create_socket_layer(socket_state);

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::runners::router())
        .merge(routes::repositories::router())
        .merge(routes::worktrees::router())
        .with_state(app_state.clone())
        .layer(socket_layer)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Tear every runner down before the process exits.
    app_state.supervisor().shutdown().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
