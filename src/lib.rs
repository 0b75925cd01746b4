//! # Coffee API
//!
//! Request authorization and admission control for a coffee shop directory
//! service, built on Axum:
//!
//! - **Credentials**: `pbkdf2_sha256` password hashes readable by the legacy
//!   Django admin, constant-time verification
//! - **Tokens**: HS256 bearer tokens carrying `userId` and `isStaff`
//! - **Admission control**: per-client token buckets with idle eviction
//! - **Gate chain**: panic containment, admission, authentication and a
//!   staff check, in a fixed order
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Recover → Trace → CORS → Admission → Authenticate → Staff  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, signup, login)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  auth (password, token, claims)     store (UserStore)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coffee_api::{AppState, Config, build_router};
//! use coffee_api::store::InMemoryUserStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(InMemoryUserStore::new()))?;
//!     let app = build_router(state.clone());
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! JWT_SECRET=change-me MODE=dev RATE_LIMIT_RPS=2 RATE_LIMIT_BURST=4 cargo run
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, Mode};
pub use context::Identity;
pub use error::{AppError, AppResult};
pub use routes::{apply_middleware, build_router};
pub use state::AppState;
