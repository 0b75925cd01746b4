//! Application routing configuration with the gate chain.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Recover      │ ← 500 + Connection: close on panic
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Admission     │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authenticate    │ ← 400/401 (bypassed for GET/OPTIONS, public routes)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      Staff       │ ← 401 unless isStaff (same bypass)
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Liveness
//! - `/api/v1/signup`, `/api/v1/login` - Accounts (public)

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    AccessPolicy, AdmissionLayer, AuthenticatedOrReadOnly, StaffOrReadOnly, recover_layer,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/signup", post(handlers::signup))
        .route("/api/v1/login", post(handlers::login));

    apply_middleware(router, &state).with_state(state)
}

/// Wrap `router` in the gate chain, in its fixed order.
///
/// Exposed so other route sets get the same ordering guarantees.
pub fn apply_middleware<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let config = &state.config;
    let policy = AccessPolicy::new(config.auth_bypass_paths.iter().cloned());

    info!(
        public_routes = ?policy.public_prefixes(),
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Configuring middleware stack"
    );

    // Layers wrap outward: the last one added runs first
    let mut router = router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(StaffOrReadOnly::new(policy.clone()))
        .layer(AuthenticatedOrReadOnly::new(state.keys.clone(), policy));

    if let Some(limiter) = &state.admission {
        router = router.layer(AdmissionLayer::new(
            limiter.clone(),
            config.mode,
            config.rate_limit_rps,
        ));
    }

    router
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(recover_layer())
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// `*` is the default and permits every origin. It is not a security
/// boundary; authentication is.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
