use crate::handlers::*;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to listen on
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
        }
    }
}

/// The HTTP surface of the allocation service.
pub struct ApiServer {
    config: Config,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        Router::new()
            .route("/allocate", post(allocate))
            .route("/release", post(release))
            .route("/health", get(health))
            .route("/api/v1/vlan-ips", get(list_vlan_ips))
            .route("/api/v1/refresh", post(start_refresh))
            .route("/api/v1/refresh/{run}/detail", get(refresh_detail))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until the token is cancelled.
    pub async fn run(self, token: CancellationToken) -> Result<(), std::io::Error> {
        let app = self.build_router();

        info!("Starting API server on {}", self.config.listen_addr);

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    }
}
