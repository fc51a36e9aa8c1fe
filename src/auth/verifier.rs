//! Token verification
//!
//! # Verification flow
//!
//! 1. Decode the JWT header (no verification) to extract `kid` and `alg`.
//! 2. Read the unverified `iss` claim and check it against the configured
//!    issuer before any network activity.
//! 3. Find the signing key in the cached JWKS; an unknown `kid` triggers a
//!    single forced refresh before failing.
//! 4. Verify the signature and standard claims (`exp`, `aud` when
//!    configured), with 60 seconds of clock-skew leeway.
//! 5. On a signature failure, force one JWKS refresh and retry, covering
//!    the window where the issuer rotated keys under an unexpired cache.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, Header, TokenData, Validation, errors::ErrorKind,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AuthConfig;

use super::{AuthContext, AuthError, JwksCache};

/// Claims the gateway cares about.
#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    exp: u64,
}

/// Verifies bearer tokens against the configured issuer's JWKS.
pub struct TokenVerifier {
    issuer: String,
    jwks_uri: String,
    audiences: Vec<String>,
    jwks: Arc<JwksCache>,
}

impl TokenVerifier {
    /// Create from the auth section of the gateway config.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.trim_end_matches('/').to_string(),
            jwks_uri: config.resolved_jwks_uri(),
            audiences: config.audiences.clone(),
            jwks: Arc::new(JwksCache::new(config.jwks_cache_ttl)),
        }
    }

    /// Validate a bearer token and derive its [`AuthContext`].
    ///
    /// # Errors
    ///
    /// Returns the matching [`AuthError`] kind; expired tokens, signature
    /// mismatches, and issuer mismatches each fail distinctly.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::Malformed)?;
        let kid = header.kid.clone().ok_or(AuthError::MissingKeyId)?;

        // Issuer check happens before touching the network.
        let issuer = extract_unverified_issuer(token)?;
        if issuer.trim_end_matches('/') != self.issuer {
            return Err(AuthError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: issuer,
            });
        }

        let key = self.find_key(&kid, false).await?;
        let validation = self.build_validation(&header);

        match verify(token, &key, &validation) {
            Err(AuthError::InvalidSignature) => {
                // The issuer may have rotated keys under an unexpired cache.
                debug!(kid = %kid, "Signature failed, forcing JWKS refresh and retrying");
                let key = self.find_key(&kid, true).await?;
                let claims = verify(token, &key, &validation)?;
                Ok(self.context(&claims, &kid))
            }
            Err(e) => Err(e),
            Ok(claims) => Ok(self.context(&claims, &kid)),
        }
    }

    fn context(&self, claims: &Claims, kid: &str) -> AuthContext {
        AuthContext {
            issuer: claims.iss.clone(),
            subject: claims.sub.clone(),
            expires_at: claims.exp,
            key_id: kid.to_string(),
        }
    }

    /// Find a decoding key by `kid`. With `force`, bypass the cache TTL; a
    /// non-forced miss retries once with a forced fetch before giving up.
    async fn find_key(&self, kid: &str, force: bool) -> Result<DecodingKey, AuthError> {
        let jwks = self
            .jwks
            .get_or_fetch(&self.issuer, &self.jwks_uri, force)
            .await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        if force {
            return Err(AuthError::UnknownKeyId(kid.to_string()));
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = self
            .jwks
            .get_or_fetch(&self.issuer, &self.jwks_uri, true)
            .await?;
        find_key_in_jwks(&jwks, kid).ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }

    fn build_validation(&self, header: &Header) -> Validation {
        let mut validation = build_validation(header);
        validation.set_issuer(&[&self.issuer]);
        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }
        validation
    }
}

/// Decode + verify and map `jsonwebtoken` failures onto [`AuthError`] kinds.
fn verify(token: &str, key: &DecodingKey, validation: &Validation) -> Result<Claims, AuthError> {
    let data: TokenData<Claims> =
        jsonwebtoken::decode(token, key, validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch {
                expected: validation
                    .iss
                    .as_ref()
                    .and_then(|s| s.iter().next().cloned())
                    .unwrap_or_default(),
                actual: String::new(),
            },
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            _ => AuthError::Malformed,
        })?;
    Ok(data.claims)
}

/// Extract the `iss` claim without signature verification.
fn extract_unverified_issuer(token: &str) -> Result<String, AuthError> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return Err(AuthError::Malformed);
    }

    let payload =
        base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1])
            .map_err(|_| AuthError::Malformed)?;

    #[derive(Deserialize)]
    struct Iss {
        iss: String,
    }
    serde_json::from_slice::<Iss>(&payload)
        .map(|c| c.iss)
        .map_err(|_| AuthError::Malformed)
}

/// Find a JWK by `kid` in a `JwkSet` and convert it to a `DecodingKey`.
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        if jwk.common.key_id.as_deref() != Some(kid) {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

/// Build a [`Validation`] from the JWT header algorithm.
fn build_validation(header: &Header) -> Validation {
    let alg = match header.alg {
        Algorithm::RS256 => Algorithm::RS256,
        Algorithm::RS384 => Algorithm::RS384,
        Algorithm::RS512 => Algorithm::RS512,
        Algorithm::ES256 => Algorithm::ES256,
        Algorithm::ES384 => Algorithm::ES384,
        other => {
            warn!(alg = ?other, "Unsupported JWT algorithm, defaulting to RS256");
            Algorithm::RS256
        }
    };

    let mut v = Validation::new(alg);
    v.leeway = 60; // clock skew tolerance between IdP and gateway host
    v
}
