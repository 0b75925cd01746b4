//! Typed request context passed from the authentication stage to handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::TokenClaims;
use crate::error::AppError;

/// The verified subject of a request and its role.
///
/// Inserted into request extensions by
/// [`AuthenticatedOrReadOnly`](crate::middleware::AuthenticatedOrReadOnly)
/// after the bearer token has been verified, and read from there by
/// [`StaffOrReadOnly`](crate::middleware::StaffOrReadOnly). Requests that
/// bypassed authentication (safe methods, public routes) carry no identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_staff: bool,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, is_staff: bool) -> Self {
        Self {
            user_id: user_id.into(),
            is_staff,
        }
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            is_staff: claims.is_staff,
        }
    }
}

/// Extract the identity set by the authentication stage.
///
/// Rejects with 401 when the request was never authenticated.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_identity_from_extensions() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut().insert(Identity::new("user-1", true));
        let (mut parts, ()) = req.into_parts();

        let identity = Identity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert!(identity.is_staff);
    }

    #[test]
    fn test_identity_from_claims() {
        let claims = TokenClaims {
            user_id: "user-9".to_string(),
            is_staff: false,
            exp: 0,
            iat: 0,
        };
        assert_eq!(Identity::from(claims), Identity::new("user-9", false));
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();

        let err = Identity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
