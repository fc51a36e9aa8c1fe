//! Gateway server assembly: HTTP router, proxy dispatcher, lifecycle

pub mod proxy;
pub mod router;
mod server;

pub use proxy::ProxyDispatcher;
pub use router::{AppState, create_router};
pub use server::Gateway;
