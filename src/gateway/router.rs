//! HTTP router, middleware, and request handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::auth::{AuthContext, AuthError, TokenVerifier};
use crate::config_reload::LiveConfig;
use crate::failsafe::{Admission, BreakerRegistry, CircuitState};
use crate::gateway::proxy::ProxyDispatcher;
use crate::metrics;
use crate::routing::{LiveRoutes, RouteTable};

/// Shared application state
pub struct AppState {
    /// Live configuration snapshot (swapped on reload)
    pub config: Arc<LiveConfig>,
    /// Live routing table (swapped on reload)
    pub routes: Arc<LiveRoutes>,
    /// Per-route circuit breakers
    pub breakers: Arc<BreakerRegistry>,
    /// Token verifier, present when auth is enabled
    pub verifier: Option<Arc<TokenVerifier>>,
    /// Outbound dispatcher
    pub proxy: ProxyDispatcher,
    /// Prometheus render handle
    pub prometheus: PrometheusHandle,
}

impl AppState {
    fn fallback_status(&self) -> StatusCode {
        StatusCode::from_u16(self.config.get().fallback.status)
            .unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(dispatch_handler)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routing table snapshot pinned by the auth middleware so the auth
/// decision and the dispatch resolve against the same table generation.
#[derive(Clone)]
struct TableSnapshot(Arc<RouteTable>);

/// Authentication middleware.
///
/// Bypassed for the configured public paths (the built-in `/health` and
/// `/metrics` by default) and for routes flagged `public` in route
/// configuration. Unmatched paths pass through so the dispatcher can
/// return its routing failure. The table snapshot used for the decision is
/// pinned on the request; a reload landing mid-request cannot flip a route
/// between the auth check and dispatch.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.get();
    let table = state.routes.load();
    let path = request.uri().path().to_string();

    if let Some(verifier) = state.verifier.as_ref().filter(|_| config.auth.enabled) {
        let public = config
            .auth
            .public_paths
            .iter()
            .any(|p| public_path_matches(p, &path))
            // No route: let the dispatcher produce the routing failure.
            || table.resolve(&path).map_or(true, |route| route.public);

        if !public {
            let token = match bearer_token(&request) {
                Ok(t) => t,
                Err(e) => return reject(&e),
            };
            match verifier.authenticate(&token).await {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                }
                Err(e) => {
                    debug!(path = %path, kind = e.kind(), "Rejected token");
                    return reject(&e);
                }
            }
        }
    }

    request.extensions_mut().insert(TableSnapshot(table));
    next.run(request).await
}

/// Allow-list check: an entry covers itself and its own sub-paths, never a
/// sibling that merely shares the prefix string (`/metrics` must not cover
/// `/metricsdata/...`).
fn public_path_matches(public: &str, path: &str) -> bool {
    path == public
        || path
            .strip_prefix(public)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Pull the bearer token out of the Authorization header.
fn bearer_token(request: &Request<Body>) -> Result<String, AuthError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::Missing)?;
    let value = header.to_str().map_err(|_| AuthError::Malformed)?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or(AuthError::Malformed)
}

fn reject(error: &AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": error.to_string(),
            "kind": error.kind(),
        })),
    )
        .into_response()
}

/// Catch-all handler: resolve → breaker admission → proxy → response.
async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let table = request
        .extensions()
        .get::<TableSnapshot>()
        .map_or_else(|| state.routes.load(), |snapshot| Arc::clone(&snapshot.0));
    let Some(route) = table.resolve(&path) else {
        debug!(%method, path = %path, "No route matched");
        metrics::request("unmatched", "no_route", started.elapsed());
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No route matched: {path}") })),
        )
            .into_response();
    };

    let subject = request
        .extensions()
        .get::<AuthContext>()
        .map(|c| c.subject.clone());

    let breaker = state.breakers.get_or_create(&route.id, &route.breaker);
    let admission = breaker.admit();
    if admission == Admission::Rejected {
        debug!(route = %route.id, "Circuit open, short-circuiting to fallback");
        metrics::request(&route.id, "fallback", started.elapsed());
        return fallback_response(state.fallback_status());
    }

    match state.proxy.dispatch(route, request).await {
        Ok(response) => {
            breaker.record_success();
            let latency = started.elapsed();
            info!(
                route = %route.id,
                %method,
                path = %path,
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                subject = subject.as_deref().unwrap_or("-"),
                trial = admission == Admission::Trial,
                "Proxied request"
            );
            metrics::request(&route.id, "ok", latency);
            response
        }
        Err(e) if e.is_breaker_failure() => {
            breaker.record_failure();
            let latency = started.elapsed();
            warn!(
                route = %route.id,
                %method,
                path = %path,
                error = %e,
                latency_ms = latency.as_millis() as u64,
                "Backend failure, returning fallback"
            );
            metrics::request(&route.id, "fallback", latency);
            fallback_response(state.fallback_status())
        }
        Err(e) => {
            // A trial with an indeterminate outcome still has to release
            // the slot; count it as a failure so the cooldown restarts.
            if admission == Admission::Trial {
                breaker.record_failure();
            }
            warn!(route = %route.id, error = %e, "Dispatch error");
            metrics::request(&route.id, "error", started.elapsed());
            (e.status(), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Fallback: configured status, empty body. Identical for timeout and
/// open-circuit paths, so the two are indistinguishable to the caller.
fn fallback_response(status: StatusCode) -> Response {
    status.into_response()
}

/// Health check handler.
///
/// Reports per-route breaker state; degraded (503) when any circuit is open.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let states = state.breakers.states();
    let healthy = states.iter().all(|(_, s)| *s != CircuitState::Open);

    let routes_json: serde_json::Map<String, serde_json::Value> = states
        .into_iter()
        .map(|(id, s)| (id, json!(s.as_str())))
        .collect();

    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "routes": state.routes.load().len(),
        "breakers": routes_json,
    });

    if healthy {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// Prometheus scrape endpoint (allow-listed; bypasses auth).
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use metrics_exporter_prometheus::PrometheusBuilder;

    use crate::config::{Config, RouteConfig};

    #[test]
    fn public_path_entry_does_not_cover_siblings() {
        assert!(public_path_matches("/metrics", "/metrics"));
        assert!(public_path_matches("/metrics", "/metrics/render"));
        assert!(!public_path_matches("/metrics", "/metricsdata/secret"));
        assert!(!public_path_matches("/health", "/healthz"));
    }

    fn route_config(id: &str, path: &str) -> RouteConfig {
        RouteConfig {
            id: id.to_string(),
            path: path.to_string(),
            // TEST-NET-1: unroutable, fails fast
            target: "http://192.0.2.1:9".to_string(),
            timeout: Duration::from_millis(100),
            order: None,
            public: false,
            headers: HashMap::new(),
            circuit_breaker: None,
        }
    }

    fn state_with_routes(routes: Vec<RouteConfig>) -> Arc<AppState> {
        let config = Config {
            routes,
            ..Default::default()
        };
        let table = RouteTable::from_config(&config);
        Arc::new(AppState {
            config: Arc::new(LiveConfig::new(config)),
            routes: Arc::new(LiveRoutes::new(table)),
            breakers: Arc::new(BreakerRegistry::new()),
            verifier: None,
            proxy: ProxyDispatcher::new(1024),
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
        })
    }

    #[tokio::test]
    async fn dispatch_follows_the_pinned_table_snapshot() {
        // The live table routes /api to "new"; the snapshot pinned on the
        // request routes it to "old". Dispatch must follow the snapshot.
        let state = state_with_routes(vec![route_config("new", "/api/**")]);
        let old_table = RouteTable::from_config(&Config {
            routes: vec![route_config("old", "/api/**")],
            ..Default::default()
        });

        let mut request = Request::builder()
            .uri("/api/x")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(TableSnapshot(Arc::new(old_table)));

        let response = dispatch_handler(State(Arc::clone(&state)), request).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ids: Vec<String> = state
            .breakers
            .states()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["old".to_string()]);
    }
}
