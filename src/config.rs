//! Configuration management
//!
//! Configuration comes from a YAML file merged with `EDGE_GATEWAY_`-prefixed
//! environment variables. Durations use humantime-style strings (`"3s"`,
//! `"500ms"`). The route list is validated at load: duplicate route ids,
//! unparseable target URIs, and zero-valued breaker thresholds are rejected
//! before the server starts.

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Loaded in order, later files override earlier. Missing files are skipped.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Circuit breaker defaults (per-route overrides in `RouteConfig`)
    pub circuit_breaker: CircuitBreakerConfig,
    /// Fallback response configuration
    pub fallback: FallbackConfig,
    /// Route definitions, in registration order
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable bearer-token authentication
    pub enabled: bool,
    /// Expected token issuer URL (the `iss` claim must match exactly)
    pub issuer: String,
    /// JWKS endpoint. Defaults to `<issuer>/.well-known/jwks.json` when empty.
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Accepted audiences (empty = audience not checked)
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Fallback JWKS cache TTL when the issuer does not advertise one
    /// via `Cache-Control: max-age`.
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,
    /// Paths that bypass authentication regardless of route config
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/metrics".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            issuer: String::new(),
            jwks_uri: None,
            audiences: Vec::new(),
            jwks_cache_ttl: Duration::from_secs(3600),
            public_paths: default_public_paths(),
        }
    }
}

impl AuthConfig {
    /// Resolve the JWKS endpoint, deriving it from the issuer when unset.
    #[must_use]
    pub fn resolved_jwks_uri(&self) -> String {
        self.jwks_uri.clone().unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", self.issuer.trim_end_matches('/'))
        })
    }
}

/// Circuit breaker configuration
///
/// Documentation defaults, not verified production values; tune per deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaking
    pub enabled: bool,
    /// Failures within `window` before opening
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Time to wait in open state before allowing a trial request
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            window: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Fallback response returned when a backend call is skipped or fails
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FallbackConfig {
    /// HTTP status of the fallback response (body is always empty)
    pub status: u16,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { status: 503 }
    }
}

/// A single route definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    /// Unique route id
    pub id: String,
    /// Path predicate. Supported forms:
    /// - exact: `/status`
    /// - recursive prefix: `/crypto/**`
    /// - bare prefix: `/crypto` (matches `/crypto` and `/crypto/...`)
    pub path: String,
    /// Backend base URI
    pub target: String,
    /// Hard per-call timeout
    #[serde(with = "humantime_serde", default = "default_route_timeout")]
    pub timeout: Duration,
    /// Tie-break order; routes with equal order keep registration order
    #[serde(default)]
    pub order: Option<i32>,
    /// Bypass authentication for this route
    #[serde(default)]
    pub public: bool,
    /// Static headers injected into proxied requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-route breaker override (falls back to the global section)
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

fn default_route_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("EDGE_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Validate the route list and breaker parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on duplicate route ids, empty or unparseable
    /// targets, bad path predicates, or zero-valued breaker settings.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if route.id.is_empty() {
                return Err(Error::Config("Route with empty id".to_string()));
            }
            if !seen.insert(route.id.as_str()) {
                return Err(Error::Config(format!("Duplicate route id: {}", route.id)));
            }
            if !route.path.starts_with('/') {
                return Err(Error::Config(format!(
                    "Route {}: path predicate must start with '/': {}",
                    route.id, route.path
                )));
            }
            Url::parse(&route.target).map_err(|e| {
                Error::Config(format!("Route {}: invalid target URI: {e}", route.id))
            })?;
            if route.timeout.is_zero() {
                return Err(Error::Config(format!(
                    "Route {}: timeout must be non-zero",
                    route.id
                )));
            }
            if let Some(cb) = &route.circuit_breaker {
                validate_breaker(&route.id, cb)?;
            }
        }
        validate_breaker("(global)", &self.circuit_breaker)?;

        if self.auth.enabled && self.auth.issuer.is_empty() {
            return Err(Error::Config(
                "auth.enabled requires auth.issuer".to_string(),
            ));
        }

        Ok(())
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path = Path::new(path_str);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {path_str}"),
                    Err(e) => tracing::warn!("Failed to load env file {path_str}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {path_str}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in route header values
    fn expand_env_vars(&mut self) {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        for route in &mut self.routes {
            for value in route.headers.values_mut() {
                *value = Self::expand_string(&re, value);
            }
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

fn validate_breaker(scope: &str, cb: &CircuitBreakerConfig) -> Result<()> {
    if cb.failure_threshold == 0 {
        return Err(Error::Config(format!(
            "{scope}: circuit_breaker.failure_threshold must be non-zero"
        )));
    }
    if cb.window.is_zero() || cb.cooldown.is_zero() {
        return Err(Error::Config(format!(
            "{scope}: circuit_breaker window and cooldown must be non-zero"
        )));
    }
    Ok(())
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() > 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn route(id: &str, path: &str) -> RouteConfig {
        RouteConfig {
            id: id.to_string(),
            path: path.to_string(),
            target: format!("http://{id}:8077"),
            timeout: Duration::from_secs(3),
            order: None,
            public: false,
            headers: HashMap::new(),
            circuit_breaker: None,
        }
    }

    #[test]
    fn routes_deserialized_from_yaml() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 9000
routes:
  - id: crypto
    path: /crypto/**
    target: http://crypto:8077
    timeout: 3s
  - id: metrics-scrape
    path: /actuator/prometheus
    target: http://internal:9090
    public: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].id, "crypto");
        assert_eq!(config.routes[0].timeout, Duration::from_secs(3));
        assert!(!config.routes[0].public);
        assert!(config.routes[1].public);
        config.validate().unwrap();
    }

    #[test]
    fn default_timeout_is_three_seconds() {
        let yaml = r#"
routes:
  - id: a
    path: /a
    target: http://a:1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.routes[0].timeout, Duration::from_secs(3));
    }

    #[test]
    fn duplicate_route_ids_rejected() {
        let config = Config {
            routes: vec![route("a", "/a"), route("a", "/b")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate route id"));
    }

    #[test]
    fn invalid_target_rejected() {
        let mut r = route("a", "/a");
        r.target = "not a uri".to_string();
        let config = Config {
            routes: vec![r],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = Config {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_without_issuer_rejected() {
        let config = Config {
            auth: AuthConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn jwks_uri_derived_from_issuer() {
        let auth = AuthConfig {
            issuer: "https://keycloak.example.com/realms/demo/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            auth.resolved_jwks_uri(),
            "https://keycloak.example.com/realms/demo/.well-known/jwks.json"
        );
    }

    #[test]
    fn header_env_expansion() {
        // Unique var name so parallel tests don't collide
        std::env::set_var("EDGE_GW_TEST_HDR", "secret-token");
        let mut r = route("a", "/a");
        r.headers
            .insert("Authorization".to_string(), "${EDGE_GW_TEST_HDR}".to_string());
        let mut config = Config {
            routes: vec![r],
            ..Default::default()
        };
        config.expand_env_vars();
        assert_eq!(config.routes[0].headers["Authorization"], "secret-token");
    }

    #[test]
    fn header_env_expansion_default_value() {
        let mut r = route("a", "/a");
        r.headers.insert(
            "X-Tier".to_string(),
            "${EDGE_GW_UNSET_VAR:-standard}".to_string(),
        );
        let mut config = Config {
            routes: vec![r],
            ..Default::default()
        };
        config.expand_env_vars();
        assert_eq!(config.routes[0].headers["X-Tier"], "standard");
    }

    #[test]
    fn humantime_roundtrip() {
        let yaml = r#"
circuit_breaker:
  window: 10s
  cooldown: 500ms
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.circuit_breaker.window, Duration::from_secs(10));
        assert_eq!(config.circuit_breaker.cooldown, Duration::from_millis(500));
    }
}
