//! Bearer-token authentication against an external identity provider
//!
//! The gateway never issues or stores credentials. It validates inbound
//! bearer tokens against the issuer's published JWKS and derives a
//! per-request [`AuthContext`]; nothing is persisted beyond the request.

mod jwks;
mod verifier;

pub use jwks::JwksCache;
pub use verifier::TokenVerifier;

use thiserror::Error;

/// Distinct authentication failure kinds, so callers can tell "retry"
/// (e.g. [`AuthError::KeyFetch`]) from "reject" (everything else).
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token on the request
    #[error("missing bearer token")]
    Missing,

    /// Token present but not a parseable JWT
    #[error("malformed token")]
    Malformed,

    /// Token signature valid but `exp` has passed
    #[error("token expired")]
    Expired,

    /// Signature does not verify against any of the issuer's keys
    #[error("invalid signature")]
    InvalidSignature,

    /// `iss` claim does not match the configured issuer
    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// Configured issuer URL
        expected: String,
        /// Issuer URL found in the token
        actual: String,
    },

    /// `aud` claim does not contain any accepted audience
    #[error("audience not accepted")]
    InvalidAudience,

    /// JWT header carries no `kid`
    #[error("token missing key id")]
    MissingKeyId,

    /// `kid` not present in the issuer's JWKS, even after a forced refresh
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    /// Network or HTTP failure fetching the JWKS
    #[error("JWKS fetch failed: {0}")]
    KeyFetch(String),
}

impl AuthError {
    /// Stable machine-readable kind label for response bodies and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::InvalidSignature => "invalid_signature",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::InvalidAudience => "invalid_audience",
            Self::MissingKeyId => "missing_key_id",
            Self::UnknownKeyId(_) => "unknown_key_id",
            Self::KeyFetch(_) => "key_fetch",
        }
    }
}

/// Validated identity derived from a bearer token.
///
/// Lives only for the duration of one request; never persisted.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Token issuer (`iss`)
    pub issuer: String,
    /// Subject (`sub`)
    pub subject: String,
    /// Expiry as a Unix timestamp (`exp`)
    pub expires_at: u64,
    /// Key id the signature was verified against
    pub key_id: String,
}
