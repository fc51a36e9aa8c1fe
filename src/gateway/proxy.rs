//! Proxy dispatcher — the only component performing outbound network I/O
//!
//! Forwards a request to the resolved route's target, preserving method,
//! headers (hop-by-hop headers stripped per RFC 7230 §6.1), and body. The
//! backend's response is returned unmodified on success. The route's hard
//! timeout wraps the whole header exchange; on timeout the outbound future
//! is dropped, which cancels the in-flight connection rather than leaving
//! it to complete in the background.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, Request, Response, Uri};
use tracing::{debug, warn};

use crate::routing::Route;
use crate::{Error, Result};

/// Hop-by-hop headers that must not be forwarded (RFC 7230 §6.1), plus
/// `Host`, which reqwest derives from the target URI.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Dispatches requests to backend targets over a shared HTTP client.
pub struct ProxyDispatcher {
    client: reqwest::Client,
    max_body_size: usize,
}

impl ProxyDispatcher {
    /// Create with a shared connection pool.
    ///
    /// No client-level timeout is set; the per-route timeout is enforced by
    /// [`dispatch`](Self::dispatch) so each route gets its own budget.
    #[must_use]
    pub fn new(max_body_size: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            max_body_size,
        }
    }

    /// Forward `request` to `route.target` and return the backend response.
    ///
    /// # Errors
    ///
    /// `BackendTimeout` when the backend does not answer within the route
    /// timeout; `BackendUnavailable` on connect or transport failures. Both
    /// are breaker failures; the caller turns them into the fallback.
    pub async fn dispatch(&self, route: &Route, request: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let upstream_uri = build_upstream_uri(&route.target, &parts.uri);

        let body_bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read request body: {e}")))?;

        let mut headers = filter_headers(&parts.headers);
        for (name, value) in &route.headers {
            if let (Ok(n), Ok(v)) = (name.parse::<HeaderName>(), value.parse()) {
                headers.insert(n, v);
            }
        }

        debug!(route = %route.id, uri = %upstream_uri, method = %parts.method, "Dispatching to backend");

        let outbound = self
            .client
            .request(to_reqwest_method(&parts.method), &upstream_uri)
            .headers(headers)
            .body(body_bytes)
            .send();

        // Dropping `outbound` on timeout cancels the in-flight call.
        let response = match tokio::time::timeout(route.timeout, outbound).await {
            Err(_) => {
                warn!(route = %route.id, timeout = ?route.timeout, "Backend timed out");
                return Err(Error::BackendTimeout(route.id.clone()));
            }
            Ok(Err(e)) => {
                warn!(route = %route.id, error = %e, "Backend unreachable");
                return Err(Error::BackendUnavailable(route.id.clone()));
            }
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        let mut builder = Response::builder().status(status);
        if let Some(response_headers) = builder.headers_mut() {
            for (name, value) in response.headers() {
                if !is_hop_by_hop(name.as_str()) {
                    response_headers.insert(name.clone(), value.clone());
                }
            }
        }

        let body = Body::from_stream(response.bytes_stream());
        builder
            .body(body)
            .map_err(|e| Error::Internal(format!("Failed to build response: {e}")))
    }
}

/// Join the route target with the original path and query.
///
/// The full matched path is forwarded (a route with predicate `/crypto/**`
/// sends `/crypto/price` to the backend), mirroring path-predicate gateways.
fn build_upstream_uri(target: &str, uri: &Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    format!("{target}{path_and_query}")
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Copy headers, dropping hop-by-hop ones.
fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name.as_str()) {
            filtered.insert(name.clone(), value.clone());
        }
    }
    filtered
}

fn to_reqwest_method(method: &Method) -> reqwest::Method {
    // axum and reqwest both sit on http 1.x; this conversion cannot fail.
    reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET)
}
