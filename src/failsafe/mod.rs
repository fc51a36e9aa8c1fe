//! Failsafe mechanisms: per-route circuit breaking

mod circuit_breaker;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitState};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

/// Registry of per-route breaker instances.
///
/// Breakers are created lazily on the first request to a route and live for
/// the lifetime of that route entry. A config reload calls [`retain_routes`]
/// so breakers for removed routes are dropped while surviving routes keep
/// their accumulated state (an open circuit stays open across a reload).
///
/// [`retain_routes`]: Self::retain_routes
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Get the breaker for a route, creating it from `config` on first use.
    pub fn get_or_create(
        &self,
        route_id: &str,
        config: &crate::config::CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(route_id) {
            return Arc::clone(&existing);
        }
        let breaker = self
            .breakers
            .entry(route_id.to_string())
            .or_insert_with(|| {
                debug!(route = %route_id, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(route_id, config))
            });
        Arc::clone(&breaker)
    }

    /// Drop breakers whose route id is no longer in the active set.
    pub fn retain_routes(&self, active_ids: &[String]) {
        self.breakers.retain(|id, _| {
            let keep = active_ids.iter().any(|a| a == id);
            if !keep {
                debug!(route = %id, "Dropping circuit breaker for removed route");
            }
            keep
        });
    }

    /// Snapshot of (route id, state) pairs for the health endpoint.
    #[must_use]
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;

    #[test]
    fn lazy_creation_returns_same_instance() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig::default();

        let a = registry.get_or_create("crypto", &config);
        let b = registry.get_or_create("crypto", &config);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn independent_per_route_state() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };

        let crypto = registry.get_or_create("crypto", &config);
        let stocks = registry.get_or_create("stocks", &config);

        crypto.record_failure();
        assert_eq!(crypto.state(), CircuitState::Open);
        assert_eq!(stocks.state(), CircuitState::Closed);
    }

    #[test]
    fn retain_drops_removed_routes() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig::default();

        registry.get_or_create("a", &config);
        registry.get_or_create("b", &config);

        registry.retain_routes(&["a".to_string()]);

        let states = registry.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, "a");
    }

    #[test]
    fn surviving_route_keeps_state_across_retain() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };

        let a = registry.get_or_create("a", &config);
        a.record_failure();
        registry.retain_routes(&["a".to_string()]);

        let again = registry.get_or_create("a", &config);
        assert_eq!(again.state(), CircuitState::Open);
    }
}
