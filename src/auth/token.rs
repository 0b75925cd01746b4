//! Bearer token issuance and verification (HS256 JWT).
//!
//! Tokens carry the subject id (`userId`), the staff flag (`isStaff`), and a
//! standard `exp` claim. Lifecycle is `Issued -> Valid -> Expired`: tokens are
//! never refreshed or revoked server-side, so expiry is the only bound.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::claims::TokenError;

/// Default validity window for issued tokens (48 hours).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Claims carried by every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Elevated (staff) role flag.
    #[serde(rename = "isStaff", default)]
    pub is_staff: bool,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,
}

/// Signing material and validity window, built once at startup.
///
/// Cheap to clone; the keys are shared read-only across requests.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    /// Build keys from the server secret.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            ttl,
        }
    }

    /// Validity window applied to newly issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `user_id`, expiring `ttl` from now.
    pub fn issue(&self, user_id: &str, is_staff: bool) -> Result<String, TokenError> {
        self.issue_at(user_id, is_staff, Utc::now().timestamp())
    }

    /// Mint a token as if the current time were `now` (Unix seconds).
    pub fn issue_at(&self, user_id: &str, is_staff: bool, now: i64) -> Result<String, TokenError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            is_staff,
            exp: now.saturating_add(ttl),
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify signature and expiry as of `now` (Unix seconds).
    ///
    /// A token is valid only while `now < exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against `now` with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "Token failed signature or format check");
                TokenError::InvalidToken
            })?
            .claims;

        if now >= claims.exp {
            debug!(exp = claims.exp, now, "Token expired");
            return Err(TokenError::InvalidToken);
        }

        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret-key-at-least-32-characters-long", DEFAULT_TOKEN_TTL)
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys();
        let token = keys.issue("42", true).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, "42");
        assert!(claims.is_staff);
        assert_eq!(claims.exp - claims.iat, 48 * 60 * 60);
    }

    #[test]
    fn test_token_is_three_part_structure() {
        let token = keys().issue("42", false).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_validity_window() {
        let keys = keys();
        let now = Utc::now().timestamp();
        let token = keys.issue_at("7", false, now).unwrap();
        let window = 48 * 60 * 60;

        assert!(keys.verify_at(&token, now).is_ok());
        assert!(keys.verify_at(&token, now + window - 1).is_ok());
        assert_eq!(
            keys.verify_at(&token, now + window),
            Err(TokenError::InvalidToken)
        );
        assert_eq!(
            keys.verify_at(&token, now + window + 1),
            Err(TokenError::InvalidToken)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = keys().issue("42", false).unwrap();
        let other = TokenKeys::new("a-completely-different-signing-secret", DEFAULT_TOKEN_TTL);

        assert_eq!(other.verify(&token), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let keys = keys();
        let token = keys.issue("42", false).unwrap();
        let staff = keys.issue("42", true).unwrap();

        // Splice the staff payload onto the non-staff signature
        let parts: Vec<&str> = token.split('.').collect();
        let staff_parts: Vec<&str> = staff.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], staff_parts[1], parts[2]);

        assert_eq!(keys.verify(&forged), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(keys().verify("not-a-token"), Err(TokenError::InvalidToken));
        assert_eq!(keys().verify(""), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", keys());
        assert!(!rendered.contains("test-secret"));
    }
}
