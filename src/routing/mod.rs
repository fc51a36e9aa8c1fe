//! Route matching and the atomically-swappable routing table

mod matcher;
mod table;

pub use matcher::PathMatcher;
pub use table::{LiveRoutes, Route, RouteTable};
