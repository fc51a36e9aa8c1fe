//! Gateway server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::proxy::ProxyDispatcher;
use super::router::{AppState, create_router};
use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::config_reload::{ConfigWatcher, LiveConfig};
use crate::failsafe::BreakerRegistry;
use crate::routing::{LiveRoutes, RouteTable};
use crate::{Error, Result};

/// Edge gateway server
///
/// Assembled by explicit composition: the routing table, breaker registry,
/// token verifier, and proxy dispatcher are constructed here and handed to
/// the router as shared state.
pub struct Gateway {
    config: Config,
    /// Config file path, for hot-reload (None disables the watcher)
    config_path: Option<PathBuf>,
}

impl Gateway {
    /// Create a new gateway from validated configuration.
    #[must_use]
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Run the gateway until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let prometheus = crate::metrics::install()?;

        let verifier = if self.config.auth.enabled {
            info!(issuer = %self.config.auth.issuer, "Authentication enabled");
            Some(Arc::new(TokenVerifier::new(&self.config.auth)))
        } else {
            warn!("Authentication disabled - all routes are open");
            None
        };

        let routes = Arc::new(LiveRoutes::new(RouteTable::from_config(&self.config)));
        let breakers = Arc::new(BreakerRegistry::new());
        let live_config = Arc::new(LiveConfig::new(self.config.clone()));
        let proxy = ProxyDispatcher::new(self.config.server.max_body_size);

        // Keep the watcher alive for the lifetime of the server.
        let _config_watcher = match &self.config_path {
            Some(path) => match ConfigWatcher::start(
                path.clone(),
                Arc::clone(&live_config),
                Arc::clone(&routes),
                Arc::clone(&breakers),
            ) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(error = %e, "Failed to start config watcher, hot-reload disabled");
                    None
                }
            },
            None => None,
        };

        let state = Arc::new(AppState {
            config: live_config,
            routes: Arc::clone(&routes),
            breakers,
            verifier,
            proxy,
            prometheus,
        });

        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            routes = routes.load().len(),
            "Gateway listening"
        );
        for route in routes.load().iter() {
            info!(
                route = %route.id,
                target = %route.target,
                timeout = ?route.timeout,
                public = route.public,
                "Registered route"
            );
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway shutdown complete");
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
