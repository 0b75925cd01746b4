//! Shared application state for Axum handlers and the gate chain.
//!
//! - **Configuration**: read-only after startup
//! - **Token keys**: the signing secret, built once and shared
//! - **User store**: account persistence behind [`UserStore`]
//! - **Admission limiter**: per-client buckets plus their eviction sweeper
//!
//! # Structured Concurrency
//!
//! The only background task is the admission sweeper, owned by the
//! limiter (`TaskTracker` + `CancellationToken`). Call `shutdown()` to stop
//! it before exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::{AdmissionLimiter, AdmissionSettings};
use crate::store::UserStore;

/// Shared application state.
///
/// Cloned per request; everything inside is `Arc`-backed.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, Arc::new(InMemoryUserStore::new()))?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Bearer token signing and verification keys
    pub keys: TokenKeys,
    /// Account storage
    pub users: Arc<dyn UserStore>,
    /// Per-client admission limiter (None = admission control disabled)
    pub admission: Option<AdmissionLimiter>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Create application state and start the admission sweeper.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the admission settings are invalid.
    pub fn new(config: Config, users: Arc<dyn UserStore>) -> AppResult<Self> {
        let keys = TokenKeys::new(&config.jwt_secret, config.token_ttl);

        let admission = if config.admission_enabled() {
            let limiter = AdmissionLimiter::new(AdmissionSettings::from(&config))
                .map_err(|e| AppError::ConfigError(e.to_string()))?;
            Some(limiter)
        } else {
            info!("Admission control disabled (RATE_LIMIT_RPS=0)");
            None
        };

        Ok(Self {
            config: Arc::new(config),
            keys,
            users,
            admission,
            started_at: Instant::now(),
        })
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        if let Some(limiter) = &self.admission {
            limiter.shutdown().await;
        }

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;

    #[tokio::test]
    async fn test_state_with_admission() {
        let state = AppState::new(Config::default(), Arc::new(InMemoryUserStore::new())).unwrap();
        assert!(state.admission.is_some());
        assert_eq!(state.keys.ttl(), state.config.token_ttl);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_without_admission() {
        let config = Config {
            rate_limit_rps: 0,
            ..Config::default()
        };
        let state = AppState::new(config, Arc::new(InMemoryUserStore::new())).unwrap();
        assert!(state.admission.is_none());
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_admission_settings() {
        let config = Config {
            rate_limit_burst: 0,
            ..Config::default()
        };
        let result = AppState::new(config, Arc::new(InMemoryUserStore::new()));
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
