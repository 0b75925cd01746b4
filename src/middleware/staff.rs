//! Staff-or-read-only middleware.
//!
//! Same bypass rule as authentication ([`AccessPolicy`]). Any other request
//! must carry an [`Identity`] whose role is staff; a missing identity or a
//! customer identity is answered with 401.
//!
//! Runs inside [`AuthenticatedOrReadOnly`](super::AuthenticatedOrReadOnly)
//! and reads the identity it attached, so the token is verified once.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::access::AccessPolicy;
use super::ip::raw_client_address_text;
use crate::context::Identity;
use crate::error::AppError;
use crate::metrics;

/// Message returned when the identity is not elevated.
pub const PERMISSION_DENIED: &str = "You don't have permission to access this view";

/// Role layer; unsafe methods on non-public routes need a staff identity.
#[derive(Clone)]
pub struct StaffOrReadOnly {
    policy: AccessPolicy,
}

impl StaffOrReadOnly {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for StaffOrReadOnly {
    type Service = StaffOrReadOnlyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StaffOrReadOnlyService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Role check service wrapper.
#[derive(Clone)]
pub struct StaffOrReadOnlyService<S> {
    inner: S,
    policy: AccessPolicy,
}

fn check_staff(req: &Request<Body>) -> Result<(), (&'static str, &'static str)> {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.is_staff => Ok(()),
        Some(_) => Err(("not_staff", PERMISSION_DENIED)),
        None => Err(("unauthenticated", "Authentication required")),
    }
}

impl<S> Service<Request<Body>> for StaffOrReadOnlyService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = if self.policy.bypasses(req.method(), req.uri().path()) {
            Ok(())
        } else {
            check_staff(&req)
        };

        match verdict {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err((reason, message)) => {
                warn!(
                    client_ip = %raw_client_address_text(&req),
                    method = %req.method(),
                    path = %req.uri().path(),
                    reason,
                    "Staff check failed"
                );
                metrics::record_auth_rejected("staff", reason);

                let response = AppError::Unauthorized(message.to_string()).into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/v1/cafes", get(|| async { "list" }).delete(|| async { "gone" }))
            .route("/api/v1/login", axum::routing::post(|| async { "login" }))
            .layer(StaffOrReadOnly::new(AccessPolicy::new(["/api/v1/login"])))
    }

    async fn delete_as(identity: Option<Identity>) -> (StatusCode, String) {
        let mut req = Request::builder()
            .method("DELETE")
            .uri("/api/v1/cafes")
            .body(Body::empty())
            .unwrap();
        if let Some(identity) = identity {
            req.extensions_mut().insert(identity);
        }
        let response = app().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_safe_method_bypasses() {
        let req = Request::builder()
            .uri("/api/v1/cafes")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_route_bypasses() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/login")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_staff_identity_passes() {
        let (status, body) = delete_as(Some(Identity::new("admin", true))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "gone");
    }

    #[tokio::test]
    async fn test_customer_identity_denied() {
        let (status, body) = delete_as(Some(Identity::new("customer", false))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains(PERMISSION_DENIED));
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (status, body) = delete_as(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authentication required"));
    }
}
