//! Route lookup and the live, atomically-replaceable table
//!
//! The table itself is immutable after construction. The active table is an
//! `Arc<RouteTable>` held in [`LiveRoutes`]; a reload builds a complete new
//! table off to the side and swaps the `Arc` in one write, so a concurrent
//! reader only ever observes the old table or the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use crate::config::{CircuitBreakerConfig, Config, RouteConfig};
use crate::routing::PathMatcher;

/// A compiled route: config entry plus its compiled matcher.
#[derive(Debug, Clone)]
pub struct Route {
    /// Unique route id
    pub id: String,
    /// Compiled path predicate
    pub matcher: PathMatcher,
    /// Backend base URI (validated at config load)
    pub target: String,
    /// Hard per-call timeout
    pub timeout: Duration,
    /// Bypass authentication
    pub public: bool,
    /// Static headers injected into proxied requests
    pub headers: HashMap<String, String>,
    /// Effective breaker settings (per-route override or global defaults)
    pub breaker: CircuitBreakerConfig,
}

impl Route {
    fn compile(config: &RouteConfig, global_breaker: &CircuitBreakerConfig) -> Self {
        Self {
            id: config.id.clone(),
            matcher: PathMatcher::compile(&config.path),
            target: config.target.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            public: config.public,
            headers: config.headers.clone(),
            breaker: config
                .circuit_breaker
                .clone()
                .unwrap_or_else(|| global_breaker.clone()),
        }
    }
}

/// Immutable routing table.
///
/// Matchers are evaluated in order; the first match wins. Routes are sorted
/// by their `order` field, with registration order preserved for ties
/// (stable sort), so an unspecified `order` means first-registered-wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from validated route configs.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut indexed: Vec<(i32, &RouteConfig)> = config
            .routes
            .iter()
            .map(|r| (r.order.unwrap_or(0), r))
            .collect();
        indexed.sort_by_key(|(order, _)| *order);

        let routes = indexed
            .into_iter()
            .map(|(_, r)| Route::compile(r, &config.circuit_breaker))
            .collect();
        Self { routes }
    }

    /// Ids of all routes in the table, for breaker-registry pruning.
    #[must_use]
    pub fn route_ids(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.id.clone()).collect()
    }

    /// Resolve a request path to the first matching route.
    ///
    /// Deterministic: with an unchanged table, the same path always resolves
    /// to the same route. `None` means no route matched (404 to the caller).
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(path))
    }

    /// Look up a route by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// All routes in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Live, atomically-swappable routing table shared across the gateway.
///
/// Readers take a read-lock only long enough to clone the inner `Arc`;
/// a reload swaps the whole `Arc` under a write-lock. In-flight requests
/// keep resolving against the snapshot they cloned.
pub struct LiveRoutes {
    inner: RwLock<Arc<RouteTable>>,
}

impl LiveRoutes {
    /// Create seeded with the startup table.
    #[must_use]
    pub fn new(table: RouteTable) -> Self {
        Self {
            inner: RwLock::new(Arc::new(table)),
        }
    }

    /// Snapshot the current table.
    #[must_use]
    pub fn load(&self) -> Arc<RouteTable> {
        Arc::clone(&self.inner.read())
    }

    /// Atomically install a new table.
    pub fn install(&self, table: RouteTable) {
        let count = table.len();
        *self.inner.write() = Arc::new(table);
        info!(routes = count, "Routing table installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    fn route_config(id: &str, path: &str, order: Option<i32>) -> RouteConfig {
        RouteConfig {
            id: id.to_string(),
            path: path.to_string(),
            target: format!("http://{id}:8077"),
            timeout: Duration::from_secs(3),
            order,
            public: false,
            headers: HashMap::new(),
            circuit_breaker: None,
        }
    }

    fn table(routes: Vec<RouteConfig>) -> RouteTable {
        RouteTable::from_config(&Config {
            routes,
            ..Default::default()
        })
    }

    #[test]
    fn first_registered_match_wins() {
        let t = table(vec![
            route_config("broad", "/api/**", None),
            route_config("narrow", "/api/v2/**", None),
        ]);

        // Both match /api/v2/x; the first-registered one wins.
        assert_eq!(t.resolve("/api/v2/x").unwrap().id, "broad");
    }

    #[test]
    fn order_field_breaks_ties() {
        let t = table(vec![
            route_config("broad", "/api/**", Some(10)),
            route_config("narrow", "/api/v2/**", Some(1)),
        ]);

        assert_eq!(t.resolve("/api/v2/x").unwrap().id, "narrow");
        assert_eq!(t.resolve("/api/v1/x").unwrap().id, "broad");
    }

    #[test]
    fn no_match_is_none() {
        let t = table(vec![route_config("crypto", "/crypto/**", None)]);
        assert!(t.resolve("/stocks/price").is_none());
    }

    #[test]
    fn resolve_is_deterministic() {
        let t = table(vec![
            route_config("a", "/svc/**", None),
            route_config("b", "/svc/**", None),
        ]);
        let first = t.resolve("/svc/x").unwrap().id.clone();
        for _ in 0..100 {
            assert_eq!(t.resolve("/svc/x").unwrap().id, first);
        }
    }

    #[test]
    fn install_replaces_whole_table() {
        let live = LiveRoutes::new(table(vec![route_config("old", "/a/**", None)]));
        let snapshot = live.load();

        live.install(table(vec![route_config("new", "/b/**", None)]));

        // The pre-reload snapshot still resolves against the old table.
        assert_eq!(snapshot.resolve("/a/x").unwrap().id, "old");
        assert!(snapshot.resolve("/b/x").is_none());

        // New readers see only the new table.
        let fresh = live.load();
        assert!(fresh.resolve("/a/x").is_none());
        assert_eq!(fresh.resolve("/b/x").unwrap().id, "new");
    }

    #[test]
    fn target_trailing_slash_trimmed() {
        let mut r = route_config("a", "/a/**", None);
        r.target = "http://a:8077/".to_string();
        let t = table(vec![r]);
        assert_eq!(t.get("a").unwrap().target, "http://a:8077");
    }
}
