pub mod handlers;
pub mod routes;
pub mod state;

use crate::config::ServerConfig;
use crate::guard::ProtectedFiles;
use crate::ledger::{JsonFileRepository, Ledger, LedgerRepository};
use crate::server::state::AppState;
use crate::tokens::TokenStore;
use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// How long in-flight downloads get once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A bound, not yet serving, gateway.
pub struct GatewayServer {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    app: Router,
    state: AppState,
    sweep_interval: Option<Duration>,
}

impl GatewayServer {
    /// Bind using the JSON file ledger named in `config`.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let repo = Arc::new(JsonFileRepository::new(
            &config.codes_file,
            config.seed_codes.clone(),
        ));
        Self::bind_with_repository(config, repo).await
    }

    pub async fn bind_with_repository(
        config: &ServerConfig,
        repo: Arc<dyn LedgerRepository>,
    ) -> Result<Self> {
        if !config.protected_dir.is_dir() {
            warn!(
                protected_dir = %config.protected_dir.display(),
                "Protected directory does not exist, every redemption will 404"
            );
        }

        let tokens = TokenStore::new(config.token_ttl, config.max_tokens);
        let files = ProtectedFiles::new(&config.protected_dir);
        let ledger = Ledger::new(repo, tokens, files);

        // Seeds storage on first run and surfaces unreadable ledgers early
        let book = ledger.load().await.context("Failed to load code ledger")?;
        info!(
            codes = book.codes.len(),
            used = book.used_count(),
            "Code ledger loaded"
        );

        let state = AppState::new(ledger);
        let app = routes::create_router(&state, &config.cors_origins);

        let listener = std::net::TcpListener::bind(config.socket_addr())
            .context(format!("Failed to bind {}", config.socket_addr()))?;
        listener
            .set_nonblocking(true)
            .context("Failed to set listener to non-blocking mode")?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            app,
            state,
            sweep_interval: config.sweep_interval,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let sweeper = self
            .sweep_interval
            .filter(|every| !every.is_zero())
            .map(|every| self.state.tokens.spawn_sweeper(every, shutdown.child_token()));

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        let shutdown_signal = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal.cancelled().await;
            info!("Shutdown requested, draining connections");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!(
            addr = %self.local_addr,
            protected_dir = %self.state.files.root().display(),
            token_ttl_secs = self.state.tokens.ttl().as_secs(),
            "Server running"
        );

        let result = axum_server::from_tcp(self.listener)
            .handle(handle)
            .serve(self.app.into_make_service())
            .await
            .context("Server error");

        // Server may have stopped on its own, make sure helpers follow
        shutdown.cancel();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        info!(outstanding_tokens = self.state.tokens.len(), "Server stopped");
        result
    }
}
