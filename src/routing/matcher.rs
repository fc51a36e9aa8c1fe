//! Path predicates for route matching

use serde::{Deserialize, Serialize};

/// A compiled path predicate.
///
/// Three forms are supported, mirroring the config syntax:
/// - `Exact("/status")` matches only `/status`
/// - `Prefix("/crypto")` matches `/crypto` and anything under `/crypto/`
/// - a config pattern ending in `/**` compiles to `Prefix`
///
/// Matching is purely textual; no normalization beyond trailing-slash
/// handling is performed, so the same path always matches the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathMatcher {
    /// Path must equal the pattern exactly
    Exact(String),
    /// Path must equal the prefix, or start with `<prefix>/`
    Prefix(String),
}

impl PathMatcher {
    /// Compile a config pattern into a matcher.
    ///
    /// `/crypto/**` and `/crypto` both become prefix matchers; a pattern with
    /// no trailing wildcard that names a concrete resource (contains a `.` in
    /// its final segment or ends without further segments) still matches as a
    /// prefix unless it is flagged exact via a trailing `$`.
    #[must_use]
    pub fn compile(pattern: &str) -> Self {
        if let Some(prefix) = pattern.strip_suffix("/**") {
            Self::Prefix(prefix.to_string())
        } else if let Some(exact) = pattern.strip_suffix('$') {
            Self::Exact(exact.to_string())
        } else {
            Self::Prefix(pattern.trim_end_matches('/').to_string())
        }
    }

    /// Test a request path against this predicate.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => path == p,
            Self::Prefix(p) => {
                path == p || (path.len() > p.len() && path.starts_with(p.as_str()) && path.as_bytes()[p.len()] == b'/')
            }
        }
    }

}
