//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET`: HMAC-SHA256 signing secret for bearer tokens (required)
//! - `PASSWORD_ITERATIONS`: PBKDF2 rounds for new password hashes (default: 320000)
//! - `AUTH_BYPASS_PATHS`: Comma-separated route prefixes reachable without a token
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*`)
//!
//! # Admission Control
//!
//! - `RATE_LIMIT_RPS`: Token refill rate per client address (default: 2)
//! - `RATE_LIMIT_BURST`: Bucket capacity per client address (default: 4)
//! - `ADMISSION_IDLE_SECS`: Idle time before a client record is evicted (default: 120)
//! - `ADMISSION_SWEEP_SECS`: Interval between eviction sweeps (default: 300)
//!
//! # Deployment Mode
//!
//! - `MODE=dev`: client addresses may carry a port (`127.0.0.1:52100`), which is stripped
//! - anything else: the client address must already be a bare IP

use std::env;
use std::fmt;
use std::time::Duration;

use crate::auth::{DEFAULT_ITERATIONS, DEFAULT_TOKEN_TTL};
use crate::error::{AppError, AppResult};

/// Default route prefixes that bypass authentication.
pub const DEFAULT_AUTH_BYPASS_PATHS: [&str; 3] =
    ["/api/v1/login", "/api/v1/signup", "/api/v1/cafes/nearest"];

/// Deployment mode; changes how client addresses are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Local development: `ip:port` peer addresses are accepted.
    Development,
    /// Behind a proxy that hands over bare IPs.
    #[default]
    Production,
}

impl Mode {
    fn from_env_value(value: &str) -> Self {
        match value.trim() {
            "dev" | "development" => Mode::Development,
            _ => Mode::Production,
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Deployment mode (default: production)
    pub mode: Mode,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Token Configuration
    // =========================================================================
    /// Signing secret for bearer tokens
    pub jwt_secret: String,

    /// Validity window for issued tokens (default: 48 hours)
    pub token_ttl: Duration,

    /// PBKDF2 rounds for newly created password hashes (default: 320000)
    pub password_iterations: u32,

    // =========================================================================
    // Admission Control Configuration
    // =========================================================================
    /// Tokens refilled per second per client (default: 2)
    /// Set to 0 to disable admission control
    pub rate_limit_rps: u32,

    /// Bucket capacity per client (default: 4)
    pub rate_limit_burst: u32,

    /// Idle time after which a client record is evicted (default: 2 minutes)
    pub admission_idle_timeout: Duration,

    /// Interval between eviction sweeps (default: 5 minutes)
    pub admission_sweep_interval: Duration,

    // =========================================================================
    // Access Configuration
    // =========================================================================
    /// Route prefixes that bypass authentication.
    /// Default: login, signup, and public nearest-cafe search
    pub auth_bypass_paths: Vec<String>,

    /// Allowed CORS origins; "*" allows every origin
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("jwt_secret", &"[redacted]")
            .field("token_ttl", &self.token_ttl)
            .field("password_iterations", &self.password_iterations)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("admission_idle_timeout", &self.admission_idle_timeout)
            .field("admission_sweep_interval", &self.admission_sweep_interval)
            .field("auth_bypass_paths", &self.auth_bypass_paths)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log_level", &self.log_level)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `JWT_SECRET` is missing or any value
    /// is invalid (e.g., non-numeric PORT, zero burst).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            mode: env::var("MODE")
                .map(|m| Mode::from_env_value(&m))
                .unwrap_or_default(),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,

            // Tokens
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            token_ttl: Self::ttl_from_hours(Self::parse_env(
                "TOKEN_TTL_HOURS",
                DEFAULT_TOKEN_TTL.as_secs() / 3600,
            )?)?,
            password_iterations: Self::parse_env("PASSWORD_ITERATIONS", DEFAULT_ITERATIONS)?,

            // Admission control
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 2)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 4)?,
            admission_idle_timeout: Duration::from_secs(Self::parse_env(
                "ADMISSION_IDLE_SECS",
                120,
            )?),
            admission_sweep_interval: Duration::from_secs(Self::parse_env(
                "ADMISSION_SWEEP_SECS",
                300,
            )?),

            // Access
            auth_bypass_paths: Self::parse_auth_bypass_paths(),
            cors_allowed_origins: Self::parse_cors_origins(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(AppError::ConfigError(
                "JWT_SECRET environment variable is not set".to_string(),
            ));
        }

        if self.token_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "TOKEN_TTL_HOURS must be greater than 0".to_string(),
            ));
        }

        if self.password_iterations == 0 {
            return Err(AppError::ConfigError(
                "PASSWORD_ITERATIONS must be greater than 0".to_string(),
            ));
        }

        if self.admission_enabled() && self.rate_limit_burst == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_BURST must be greater than 0 when RATE_LIMIT_RPS is set".to_string(),
            ));
        }

        if self.admission_idle_timeout.is_zero() || self.admission_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "ADMISSION_IDLE_SECS and ADMISSION_SWEEP_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if admission control is enabled.
    pub fn admission_enabled(&self) -> bool {
        self.rate_limit_rps > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Convert `TOKEN_TTL_HOURS` to a duration, rejecting values that overflow.
    fn ttl_from_hours(hours: u64) -> AppResult<Duration> {
        hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                AppError::ConfigError(format!("TOKEN_TTL_HOURS is too large: {hours}"))
            })
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        split_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()))
    }

    /// Parse auth bypass prefixes from environment variable.
    ///
    /// Entries that do not start with `/` are dropped.
    fn parse_auth_bypass_paths() -> Vec<String> {
        match env::var("AUTH_BYPASS_PATHS") {
            Ok(raw) => split_list(&raw)
                .into_iter()
                .filter(|p| p.starts_with('/'))
                .collect(),
            Err(_) => DEFAULT_AUTH_BYPASS_PATHS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// The secret is a fixed development value; production deployments must use
/// `Config::from_env()`, which requires `JWT_SECRET`.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            mode: Mode::Development,
            max_request_body_size: 1024 * 1024,
            // Tokens
            jwt_secret: "development-only-secret".to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            password_iterations: DEFAULT_ITERATIONS,
            // Admission control
            rate_limit_rps: 2,
            rate_limit_burst: 4,
            admission_idle_timeout: Duration::from_secs(120),
            admission_sweep_interval: Duration::from_secs(300),
            // Access
            auth_bypass_paths: DEFAULT_AUTH_BYPASS_PATHS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
            metrics_port: 0,
        }
    }
}
