//! Per-client rate limiting
//!
//! [`RateLimiter`] is the seam: anything that can answer "may this client make
//! another request now?" can gate a router through [`rate_limit_middleware`].
//! [`GovernorRateLimiter`] is the in-process implementation, a keyed GCRA
//! limiter from `governor` with one cell bucket per client key.
//!
//! Rejected requests get `429 Too Many Requests` with a `Retry-After` header.

use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::error::Error;

/// Key used when a request carries no client address at all
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Outcome of asking a limiter about one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed
    Allowed,
    /// The client is over its quota
    Rejected {
        /// Time until the next request would be admitted
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Decides whether a client may make another request
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of the client's quota, if available
    fn admit(&self, key: &str) -> impl Future<Output = Admission> + Send;
}

/// In-memory keyed GCRA limiter
pub struct GovernorRateLimiter {
    enabled: bool,
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl std::fmt::Debug for GovernorRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRateLimiter")
            .field("enabled", &self.enabled)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl GovernorRateLimiter {
    /// Build a limiter from configuration
    ///
    /// `requests_per_period` cells replenish evenly over `period_secs`, and up
    /// to `burst_size` requests may arrive back to back.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let requests = config.requests_per_period.max(1);
        let replenish_interval = (config.period() / requests).max(Duration::from_nanos(1));
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        let quota = Quota::with_period(replenish_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        tracing::debug!(
            enabled = config.enabled,
            requests_per_period = requests,
            period_secs = config.period_secs,
            burst = burst.get(),
            "Configured local rate limiter"
        );

        Self {
            enabled: config.enabled,
            limiter: DefaultKeyedRateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Check the quota for a key without going through the async seam
    pub fn check(&self, key: &str) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Admission::Allowed,
            Err(not_until) => Admission::Rejected {
                retry_after: not_until.wait_time_from(self.clock.now()),
            },
        }
    }

    /// Forget clients whose buckets have fully refilled
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients with a bucket in memory
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Prune idle clients every `every` until `cancel` fires
    ///
    /// Client keys come from request headers, so without pruning the keyed
    /// store grows with every distinct value a caller sends.
    pub fn spawn_pruner(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::debug!("Rate limiter pruner stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.prune();
                        tracing::trace!(
                            tracked_clients = limiter.tracked_clients(),
                            "Pruned rate limiter"
                        );
                    }
                }
            }
        })
    }
}

impl RateLimiter for GovernorRateLimiter {
    async fn admit(&self, key: &str) -> Admission {
        self.check(key)
    }
}

/// Identify the client a request comes from
///
/// Uses the first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
/// address when the server was started with connect info, and finally
/// [`ANONYMOUS_CLIENT`].
pub fn client_key(request: &Request) -> String {
    forwarded_client(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}

/// Middleware that rejects clients over their quota
///
/// ```rust,ignore
/// let limiter = Arc::new(GovernorRateLimiter::from_config(&config.rate_limit));
/// let app = Router::new()
///     .route("/venues", get(list_venues))
///     .layer(middleware::from_fn_with_state(
///         limiter,
///         rate_limit_middleware::<GovernorRateLimiter>,
///     ));
/// ```
pub async fn rate_limit_middleware<L>(
    State(limiter): State<Arc<L>>,
    request: Request,
    next: Next,
) -> Result<Response, Error>
where
    L: RateLimiter + 'static,
{
    let key = client_key(&request);

    match limiter.admit(&key).await {
        Admission::Allowed => Ok(next.run(request).await),
        Admission::Rejected { retry_after } => {
            tracing::warn!(
                client = %key,
                path = %request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            Err(Error::RateLimitExceeded { retry_after })
        }
    }
}
