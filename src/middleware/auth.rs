//! Authenticate-or-read-only middleware.
//!
//! # Behavior
//!
//! - Safe methods (`GET`, `OPTIONS`) and public route prefixes are forwarded
//!   untouched, see [`AccessPolicy`]
//! - Every other request must carry `Authorization: <scheme> <token>` with a
//!   valid, unexpired token signed by the server secret
//! - On success the subject and its role are attached as [`Identity`] for
//!   downstream stages
//!
//! # Failure Responses
//!
//! | Condition | Status |
//! |---|---|
//! | header missing or not two parts | 400 |
//! | bad signature, expired, wrong claim | 401 |
//!
//! A failed request never reaches the inner service.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::access::AccessPolicy;
use super::ip::raw_client_address_text;
use crate::auth::{TokenError, TokenKeys, claims_from_request};
use crate::context::Identity;
use crate::error::AppError;
use crate::metrics;

/// Authentication layer; unsafe methods on non-public routes need a token.
#[derive(Clone)]
pub struct AuthenticatedOrReadOnly {
    keys: TokenKeys,
    policy: AccessPolicy,
}

impl AuthenticatedOrReadOnly {
    pub fn new(keys: TokenKeys, policy: AccessPolicy) -> Self {
        Self { keys, policy }
    }
}

impl<S> Layer<S> for AuthenticatedOrReadOnly {
    type Service = AuthenticatedOrReadOnlyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticatedOrReadOnlyService {
            inner,
            keys: self.keys.clone(),
            policy: self.policy.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthenticatedOrReadOnlyService<S> {
    inner: S,
    keys: TokenKeys,
    policy: AccessPolicy,
}

impl<S> AuthenticatedOrReadOnlyService<S> {
    fn authenticate(&self, req: &Request<Body>) -> Result<Identity, TokenError> {
        claims_from_request(req.headers(), &self.keys).map(Identity::from)
    }
}

fn rejection_reason(err: &TokenError) -> &'static str {
    match err {
        TokenError::MissingHeader => "missing_header",
        TokenError::MalformedHeader => "malformed_header",
        TokenError::InvalidToken => "invalid_token",
        TokenError::UnknownClaim(_) => "unknown_claim",
        TokenError::Encoding(_) => "encoding",
    }
}

impl<S> Service<Request<Body>> for AuthenticatedOrReadOnlyService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        if self.policy.bypasses(req.method(), req.uri().path()) {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        match self.authenticate(&req) {
            Ok(identity) => {
                debug!(
                    user_id = %identity.user_id,
                    is_staff = identity.is_staff,
                    path = %req.uri().path(),
                    "Request authenticated"
                );
                req.extensions_mut().insert(identity);

                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(err) => {
                warn!(
                    client_ip = %raw_client_address_text(&req),
                    method = %req.method(),
                    path = %req.uri().path(),
                    error = %err,
                    "Authentication failed"
                );
                metrics::record_auth_rejected("authenticate", rejection_reason(&err));

                let response = AppError::from(err).into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
