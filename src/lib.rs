//! Edge Gateway
//!
//! A minimal API gateway with dynamic route dispatch and per-route fault
//! isolation:
//!
//! - **Routing**: path-predicate routes loaded from config, hot-reloaded by
//!   atomic table replacement
//! - **Circuit breaking**: per-route breaker with rolling failure window,
//!   cooldown, and a single half-open trial
//! - **Authentication**: bearer-token validation against the issuer's JWKS
//! - **Observability**: Prometheus metrics endpoint and structured
//!   per-request logs with correlation ids
//!
//! The identity provider, config source, backends, metrics scraper, and log
//! collector are external systems; the gateway only talks to them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod config_reload;
pub mod error;
pub mod failsafe;
pub mod gateway;
pub mod metrics;
pub mod routing;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
