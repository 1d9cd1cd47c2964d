//! Relying party server

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::router::{AppState, create_router};
use crate::backend::BackendServices;
use crate::cache::TtlCache;
use crate::config::{AuthSession, Config, Platform};
use crate::oauth::{TokenManager, TokenProvider};
use crate::{Error, Result};

/// FIDO2 relying party server
pub struct Server {
    /// Validated configuration
    config: Config,
}

impl Server {
    /// Create a server from validated configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self, host: &str, port: u16) -> Result<()> {
        let addr = SocketAddr::new(
            host.parse()
                .map_err(|e| Error::Config(format!("invalid host '{host}': {e}")))?,
            port,
        );

        // No per-call retries; a slow backend surfaces as an error rather
        // than a hung request.
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;
        let services = BackendServices::from_config(&self.config, http)?;

        let cache = Arc::new(TtlCache::new());
        let api_tokens = Arc::new(TokenManager::new(
            Arc::clone(&services.api_tokens) as Arc<dyn TokenProvider>,
            Arc::clone(&cache),
        ));

        let state = Arc::new(AppState {
            platform: self.config.platform,
            auth_session: self.config.auth_session,
            cache,
            webauthn: services.webauthn,
            users: services.users,
            api_tokens,
            auth_tokens: services.auth_tokens,
            address: format!("http://{host}:{port}"),
        });

        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            host = %host,
            port = port,
            platform = %self.config.platform,
            relying_party = %self.config.relying_party_id,
            "FIDO2 relying party server listening"
        );
        if self.config.platform == Platform::Isva {
            info!(auth_session = %self.config.auth_session, "ISVA sign-in session mode");
            if self.config.auth_session == AuthSession::Token {
                info!("Sign-in expects the ISVA mediator to return an access token");
            }
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
