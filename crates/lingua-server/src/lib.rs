//! HTTP front end for the bridge
//!
//! Accepts Chat Completions, Messages and Responses requests and forwards
//! them to the configured upstream provider.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod handler;
mod health;
pub mod upstream;

use std::net::SocketAddr;

use axum::Router;
use lingua_config::Config;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handler::{AppState, bridge_router};

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    pub fn new(config: &Config) -> Self {
        let listen_address = config.server.bind_address();
        let provider = config.upstream.provider;

        let mut models: Vec<String> = Vec::new();
        for model in config.models.target.iter().chain(config.models.mapping.values()) {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }

        let state = AppState::new(upstream::build_upstreams(config), models, provider);

        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health));
        }

        app = app.merge(bridge_router(state)).layer(TraceLayer::new_for_http());

        tracing::info!(%provider, "bridge routes ready");

        Self {
            router: app,
            listen_address,
        }
    }

    /// Get the configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
