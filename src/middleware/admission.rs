//! Per-client admission control using a token bucket.
//!
//! # Algorithm
//!
//! Every distinct client IP gets its own Governor limiter (GCRA, equivalent
//! to a token bucket): capacity `burst` tokens, refilled at `rps` tokens per
//! second. Defaults are 4 and 2, i.e. bursts of four and a steady two
//! requests per second.
//!
//! # Shared State
//!
//! One mutex guards the map from IP to `(limiter, last_seen)`. It is held for
//! the lookup/insert and the token check only, never across the downstream
//! request. A background sweeper takes the same lock once per interval and
//! removes records idle longer than the idle timeout. With the defaults
//! (5 minute sweep, 2 minute idle) a record outlives its last request by at
//! most ~7 minutes, so memory stays proportional to recently active clients.
//!
//! # Response
//!
//! On rejection (429):
//! - `Retry-After`: Seconds until the next request will be accepted
//! - `X-RateLimit-Limit`: Configured refill rate
//!
//! A client address that cannot be parsed is answered with 500: under the
//! configured [`Mode`] that means the deployment and the proxy disagree.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

use super::ip::{client_ip, raw_client_address_text};
use crate::config::{Config, Mode};
use crate::error::AppError;
use crate::metrics;

/// Error type for admission limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// Refill rate cannot be zero.
    ZeroRps,
    /// Bucket capacity cannot be zero.
    ZeroBurst,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::ZeroRps => {
                write!(f, "RPS must be greater than 0; disable admission control instead")
            }
            AdmissionError::ZeroBurst => write!(f, "burst capacity must be greater than 0"),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Limiter tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSettings {
    /// Tokens refilled per second.
    pub rps: u32,
    /// Bucket capacity.
    pub burst: u32,
    /// Records idle longer than this are evicted.
    pub idle_timeout: Duration,
    /// Interval between eviction sweeps.
    pub sweep_interval: Duration,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            rps: 2,
            burst: 4,
            idle_timeout: Duration::from_secs(2 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl From<&Config> for AdmissionSettings {
    fn from(config: &Config) -> Self {
        Self {
            rps: config.rate_limit_rps,
            burst: config.rate_limit_burst,
            idle_timeout: config.admission_idle_timeout,
            sweep_interval: config.admission_sweep_interval,
        }
    }
}

impl AdmissionSettings {
    fn quota(&self) -> Result<Quota, AdmissionError> {
        let rps = NonZeroU32::new(self.rps).ok_or(AdmissionError::ZeroRps)?;
        let burst = NonZeroU32::new(self.burst).ok_or(AdmissionError::ZeroBurst)?;
        Ok(Quota::per_second(rps).allow_burst(burst))
    }
}

/// A request was refused; the bucket refills after `retry_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub retry_after: Duration,
}

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

struct ClientEntry<C: Clock> {
    limiter: DirectLimiter<C>,
    last_seen: C::Instant,
}

struct Shared<C: Clock> {
    clients: Mutex<HashMap<IpAddr, ClientEntry<C>>>,
    quota: Quota,
    clock: C,
    idle_timeout: Duration,
}

impl<C: Clock + Clone> Shared<C> {
    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientEntry<C>>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, ip: IpAddr) -> Result<(), Throttled> {
        let now = self.clock.now();
        let mut clients = self.clients();

        let entry = clients.entry(ip).or_insert_with(|| ClientEntry {
            limiter: RateLimiter::direct_with_clock(self.quota, self.clock.clone()),
            last_seen: now,
        });
        entry.last_seen = now;

        entry.limiter.check().map_err(|not_until| Throttled {
            retry_after: not_until.wait_time_from(now),
        })
    }

    fn sweep(&self) -> (usize, usize) {
        let now = self.clock.now();
        let mut clients = self.clients();
        let before = clients.len();

        clients.retain(|_, entry| {
            Duration::from(now.duration_since(entry.last_seen)) <= self.idle_timeout
        });

        (before - clients.len(), clients.len())
    }
}

/// Per-client token-bucket admission limiter.
///
/// The address map is private; callers only see [`check`](Self::check) /
/// [`admit`](Self::admit). Construction starts the eviction sweeper, and
/// [`shutdown`](Self::shutdown) stops it. Cloning shares the same state.
///
/// Must be constructed inside a Tokio runtime.
#[derive(Clone)]
pub struct AdmissionLimiter<C: Clock = DefaultClock> {
    shared: Arc<Shared<C>>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AdmissionLimiter<DefaultClock> {
    /// Create a limiter on the system clock and start its sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if `rps` or `burst` is zero.
    pub fn new(settings: AdmissionSettings) -> Result<Self, AdmissionError> {
        Self::with_clock(settings, DefaultClock::default())
    }
}

impl<C> AdmissionLimiter<C>
where
    C: Clock + Clone + Send + Sync + 'static,
    C::Instant: Send,
{
    /// Create a limiter on a custom clock and start its sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if `rps` or `burst` is zero.
    pub fn with_clock(settings: AdmissionSettings, clock: C) -> Result<Self, AdmissionError> {
        let quota = settings.quota()?;

        let limiter = Self {
            shared: Arc::new(Shared {
                clients: Mutex::new(HashMap::new()),
                quota,
                clock,
                idle_timeout: settings.idle_timeout,
            }),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        limiter.spawn_sweeper(settings.sweep_interval);
        Ok(limiter)
    }

    /// Consume one token for `ip`, creating its record on first sight.
    ///
    /// # Errors
    ///
    /// [`Throttled`] when the bucket is empty.
    pub fn check(&self, ip: IpAddr) -> Result<(), Throttled> {
        self.shared.check(ip)
    }

    /// `true` if a request from `ip` is admitted.
    pub fn admit(&self, ip: IpAddr) -> bool {
        self.check(ip).is_ok()
    }

    /// Remove records idle longer than the idle timeout.
    ///
    /// Returns the number of records evicted.
    pub fn sweep(&self) -> usize {
        let (evicted, remaining) = self.shared.sweep();
        metrics::record_admission_sweep(evicted, remaining);
        evicted
    }

    /// Number of client records currently held.
    pub fn tracked_clients(&self) -> usize {
        self.shared.clients().len()
    }

    /// Whether a record exists for `ip`.
    pub fn is_tracked(&self, ip: IpAddr) -> bool {
        self.shared.clients().contains_key(&ip)
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        debug!("Admission sweeper stopped");
    }

    fn spawn_sweeper(&self, every: Duration) {
        let shared = self.shared.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Admission sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        // One bounded pass per wake; the lock is not held while sleeping
                        let (evicted, remaining) = shared.sweep();
                        metrics::record_admission_sweep(evicted, remaining);
                        if evicted > 0 {
                            debug!(evicted, remaining, "Evicted idle admission records");
                        }
                    }
                }
            }
        });
    }
}

/// Admission control layer for the Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = AdmissionLimiter::new(AdmissionSettings::default())?;
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(AdmissionLayer::new(limiter, Mode::Production));
/// ```
#[derive(Clone)]
pub struct AdmissionLayer<C: Clock = DefaultClock> {
    limiter: AdmissionLimiter<C>,
    mode: Mode,
    limit: u32,
}

impl<C: Clock> AdmissionLayer<C> {
    pub fn new(limiter: AdmissionLimiter<C>, mode: Mode, limit: u32) -> Self {
        info!(?mode, limit, "Admission control enabled");
        Self {
            limiter,
            mode,
            limit,
        }
    }
}

impl<S, C: Clock + Clone> Layer<S> for AdmissionLayer<C> {
    type Service = AdmissionService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            limiter: self.limiter.clone(),
            mode: self.mode,
            limit: self.limit,
        }
    }
}

/// Admission control service wrapper.
#[derive(Clone)]
pub struct AdmissionService<S, C: Clock = DefaultClock> {
    inner: S,
    limiter: AdmissionLimiter<C>,
    mode: Mode,
    limit: u32,
}

impl<S, C> Service<Request<Body>> for AdmissionService<S, C>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    C: Clock + Clone + Send + Sync + 'static,
    C::Instant: Send,
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
        // Decide before boxing: the limiter lock never lives inside the future
        let verdict = match client_ip(&req, self.mode) {
            Ok(ip) => self.limiter.check(ip).map_err(|throttled| (ip, throttled)),
            Err(err) => {
                error!(
                    raw_address = %raw_client_address_text(&req),
                    mode = ?self.mode,
                    error = %err,
                    "Couldn't derive client address"
                );
                let response = AppError::from(err).into_response();
                return Box::pin(async move { Ok(response) });
            }
        };

        match verdict {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err((ip, throttled)) => {
                warn!(
                    client_ip = %ip,
                    path = %req.uri().path(),
                    retry_after_ms = throttled.retry_after.as_millis() as u64,
                    "Rate limit exceeded for client"
                );
                metrics::record_admission_rejected();

                let mut response = AppError::RateLimited {
                    retry_after: throttled.retry_after,
                }
                .into_response();
                if let Ok(value) = HeaderValue::from_str(&self.limit.to_string()) {
                    response.headers_mut().insert("x-ratelimit-limit", value);
                }

                Box::pin(async move { Ok(response) })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn fake_limiter() -> (AdmissionLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let limiter = AdmissionLimiter::with_clock(AdmissionSettings::default(), clock.clone())
            .unwrap();
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_zero_settings_rejected() {
        let zero_rps = AdmissionSettings {
            rps: 0,
            ..AdmissionSettings::default()
        };
        assert!(matches!(
            AdmissionLimiter::new(zero_rps),
            Err(AdmissionError::ZeroRps)
        ));

        let zero_burst = AdmissionSettings {
            burst: 0,
            ..AdmissionSettings::default()
        };
        assert!(matches!(
            AdmissionLimiter::new(zero_burst),
            Err(AdmissionError::ZeroBurst)
        ));
    }

    #[tokio::test]
    async fn test_burst_then_throttle_then_refill() {
        let (limiter, clock) = fake_limiter();
        let client = ip("203.0.113.7");

        for n in 1..=4 {
            assert!(limiter.admit(client), "request {n} of the burst should pass");
        }
        let throttled = limiter.check(client).unwrap_err();
        assert_eq!(throttled.retry_after, Duration::from_millis(500));

        clock.advance(Duration::from_millis(500));
        assert!(limiter.admit(client), "one token refilled after 500ms");
        assert!(!limiter.admit(client), "only one token refilled");

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_clients_have_separate_buckets() {
        let (limiter, _clock) = fake_limiter();

        for _ in 0..4 {
            assert!(limiter.admit(ip("10.0.0.1")));
        }
        assert!(!limiter.admit(ip("10.0.0.1")));
        assert!(limiter.admit(ip("10.0.0.2")));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test]
    async fn test_rejected_request_still_refreshes_last_seen() {
        let (limiter, clock) = fake_limiter();
        let client = ip("10.0.0.1");

        for _ in 0..5 {
            limiter.admit(client);
        }
        clock.advance(Duration::from_secs(100));
        limiter.admit(client);
        clock.advance(Duration::from_secs(100));

        assert_eq!(limiter.sweep(), 0);
        assert!(limiter.is_tracked(client));
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_idle_clients() {
        let (limiter, clock) = fake_limiter();
        let idle = ip("192.0.2.1");
        let recent = ip("192.0.2.2");

        limiter.admit(idle);
        clock.advance(Duration::from_secs(90));
        limiter.admit(recent);
        clock.advance(Duration::from_secs(60));

        // idle: 150s since last request, recent: 60s
        assert_eq!(limiter.sweep(), 1);
        assert!(!limiter.is_tracked(idle));
        assert!(limiter.is_tracked(recent));
    }

    #[tokio::test]
    async fn test_evicted_client_starts_with_full_bucket() {
        let (limiter, clock) = fake_limiter();
        let client = ip("192.0.2.9");

        for _ in 0..4 {
            limiter.admit(client);
        }
        clock.advance(Duration::from_secs(121));
        limiter.sweep();

        for n in 1..=4 {
            assert!(limiter.admit(client), "request {n} should pass after eviction");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_runs_on_interval() {
        let (limiter, clock) = fake_limiter();
        limiter.admit(ip("198.51.100.1"));
        clock.advance(Duration::from_secs(3 * 60));

        // Paused runtime: time only auto-advances once the sweeper is idle again
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        tokio::task::yield_now().await;

        assert_eq!(limiter.tracked_clients(), 0);
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_layer_on_fake_clock_throttles_and_refills() {
        use axum::Router;
        use axum::http::StatusCode;
        use axum::routing::get;
        use tower::ServiceExt;

        let (limiter, clock) = fake_limiter();
        let app = Router::new()
            .route("/cafes", get(|| async { "ok" }))
            .layer(AdmissionLayer::new(limiter.clone(), Mode::Production, 2));

        let request = || {
            Request::builder()
                .uri("/cafes")
                .header("x-forwarded-for", "203.0.113.50")
                .body(Body::empty())
                .unwrap()
        };

        for n in 1..=4 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "request {n}");
        }
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");

        clock.advance(Duration::from_millis(500));
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (limiter, _clock) = fake_limiter();
        limiter.shutdown().await;
        limiter.shutdown().await;
        // Checks keep working after the sweeper stops
        assert!(limiter.admit(ip("127.0.0.1")));
    }
}
