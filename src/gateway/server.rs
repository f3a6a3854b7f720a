//! Gateway server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::store::spawn_reaper;
use crate::{Error, Result};

/// BrandHalo credential gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Stores and collaborators
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a new gateway
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::from_config(&config)?);
        Ok(Self { config, state })
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        if self.config.reaper.enabled {
            spawn_reaper(
                self.state.oauth.expiring_stores(),
                self.config.reaper.interval,
                shutdown_tx.subscribe(),
            );
        }

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        let metadata = &self.state.oauth.metadata;
        info!("============================================================");
        info!("BRANDHALO GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(issuer = %metadata.issuer, "OAuth authorization server");
        info!("  {}", metadata.authorization_endpoint);
        info!("  {}", metadata.token_endpoint);
        info!("  {}", metadata.registration_endpoint);
        info!(
            code_ttl = ?self.config.oauth.code_ttl,
            access_token_ttl = ?self.config.oauth.access_token_ttl,
            refresh_token_ttl = ?self.config.oauth.refresh_token_ttl,
            "Credential lifetimes"
        );
        if self.config.reaper.enabled {
            info!(interval = ?self.config.reaper.interval, "Expired credential reaper enabled");
        }
        if self.config.session.shared_secret.is_none() {
            warn!("SESSION headers unguarded - only expose this gateway behind the session proxy");
        }
        info!("============================================================");

        let drain_timeout = self.config.server.shutdown_timeout;
        let mut drain_rx = shutdown_tx.subscribe();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();

        tokio::select! {
            result = server => {
                result.map_err(|e| Error::Internal(e.to_string()))?;
            }
            () = async {
                let _ = drain_rx.recv().await;
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!(timeout = ?drain_timeout, "Graceful shutdown timed out, dropping connections");
            }
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
