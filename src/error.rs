//! Error types for the edge gateway

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No route matched the request path
    #[error("No route matched: {0}")]
    NoRouteMatched(String),

    /// Authentication failure (rejected before dispatch)
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Backend did not respond within the route timeout
    #[error("Backend timeout on route: {0}")]
    BackendTimeout(String),

    /// Backend unreachable or returned a transport-level failure
    #[error("Backend unavailable on route: {0}")]
    BackendUnavailable(String),

    /// Circuit breaker is open for the route; backend was not contacted
    #[error("Circuit open for route: {0}")]
    CircuitOpen(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable caller-visible status for this error.
    ///
    /// Breaker failures (`BackendTimeout`, `BackendUnavailable`, `CircuitOpen`)
    /// are surfaced through the configured fallback response instead; the
    /// status here is what the fallback defaults to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoRouteMatched(_) => StatusCode::NOT_FOUND,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BackendTimeout(_) | Self::BackendUnavailable(_) | Self::CircuitOpen(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error counts as a breaker failure for the route.
    #[must_use]
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Self::BackendTimeout(_) | Self::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_route_maps_to_404() {
        assert_eq!(
            Error::NoRouteMatched("/nope".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn auth_errors_map_to_401() {
        assert_eq!(
            Error::Auth(AuthError::Missing).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Auth(AuthError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn breaker_paths_map_to_503() {
        assert_eq!(
            Error::BackendTimeout("crypto".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::CircuitOpen("crypto".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn breaker_failure_classification() {
        assert!(Error::BackendTimeout("r".into()).is_breaker_failure());
        assert!(Error::BackendUnavailable("r".into()).is_breaker_failure());
        // An open circuit short-circuits; it is not a new failure observation.
        assert!(!Error::CircuitOpen("r".into()).is_breaker_failure());
        assert!(!Error::NoRouteMatched("/x".into()).is_breaker_failure());
    }
}
