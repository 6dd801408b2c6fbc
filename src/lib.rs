pub mod adapters;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod ports;
pub mod push;
pub mod state;
pub mod types;

pub use app::{app, build_state, router};
pub use error::StartupError;
pub use notify::Notifier;
pub use push::VapidCredentials;

use std::net::SocketAddr;

pub async fn serve(addr: SocketAddr, config: config::AppConfig) -> Result<(), StartupError> {
    let state = app::build_state(config)?;
    let notifier = state.notifier.clone();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(StartupError::Bind)?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
                return;
            }
            // Open event streams never finish on their own.
            let closed = notifier.shutdown();
            tracing::info!(closed, "shutting down");
        })
        .await
        .map_err(StartupError::Serve)
}
