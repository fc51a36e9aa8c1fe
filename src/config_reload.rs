//! Config hot-reload
//!
//! Watches the config file for changes and, on a successful parse +
//! validation, installs a complete new routing table and config snapshot.
//! Installation is atomic: readers only ever see the old or the new table,
//! never a mix, and in-flight requests keep the snapshot they resolved
//! against. A change that fails to parse or validate is logged and ignored,
//! so the gateway keeps serving the last-known-good configuration when the
//! config source is broken or transiently unavailable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::failsafe::BreakerRegistry;
use crate::routing::{LiveRoutes, RouteTable};
use crate::Result;

/// Live, atomically-swappable config snapshot shared across the gateway.
///
/// Readers take a read-lock only long enough to clone the inner `Arc`;
/// writers swap the whole `Arc` under a write-lock.
pub struct LiveConfig {
    inner: RwLock<Arc<Config>>,
}

impl LiveConfig {
    /// Create seeded with the startup configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Clone the current active configuration snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Config> {
        Arc::clone(&self.inner.read())
    }

    /// Atomically replace the current config.
    pub fn set(&self, config: Config) {
        *self.inner.write() = Arc::new(config);
    }
}

/// Apply a freshly loaded config: swap the snapshot, install the new route
/// table, and prune breakers for routes that no longer exist. Breakers for
/// surviving routes keep their state (an open circuit stays open).
pub fn apply_reload(
    config: Config,
    live: &LiveConfig,
    routes: &LiveRoutes,
    breakers: &BreakerRegistry,
) {
    let table = RouteTable::from_config(&config);
    let ids = table.route_ids();

    live.set(config);
    routes.install(table);
    breakers.retain_routes(&ids);
}

/// Watches the config file and applies valid changes.
///
/// The watcher thread is detached; dropping the returned handle stops it.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `path`. Reload events are debounced so editors that
    /// write in multiple steps trigger a single reload.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be created.
    pub fn start(
        path: PathBuf,
        live: Arc<LiveConfig>,
        routes: Arc<LiveRoutes>,
        breakers: Arc<BreakerRegistry>,
    ) -> Result<Self> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let last_event: Arc<Mutex<Instant>> = Arc::new(Mutex::new(Instant::now()));

        let debounce = Duration::from_millis(250);
        let event_clock = Arc::clone(&last_event);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let Ok(event) = event else { return };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            let mut last = event_clock.lock();
            if last.elapsed() < debounce {
                return;
            }
            *last = Instant::now();
            let _ = tx.send(());
        })
        .map_err(|e| crate::Error::Config(format!("Failed to create config watcher: {e}")))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| crate::Error::Config(format!("Failed to watch {}: {e}", path.display())))?;

        info!(path = %path.display(), "Config hot-reload enabled");

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Let the writer finish before re-reading the file.
                tokio::time::sleep(debounce).await;
                match Config::load(Some(&path)) {
                    Ok(config) => {
                        info!(routes = config.routes.len(), "Config reloaded");
                        apply_reload(config, &live, &routes, &breakers);
                    }
                    Err(e) => {
                        warn!(error = %e, "Config reload failed, keeping last-known-good");
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}
