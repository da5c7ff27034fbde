//! Per-client admission control with continuous-refill token buckets.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;
use crate::routing::handler::{Handler, HandlerFuture};

/// Identity used for requests that carry no connection info.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A continuous-refill token bucket.
///
/// Tokens accrue fractionally at `refill_rate` per second up to `capacity`;
/// each admitted request consumes one whole token.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Refill for the time elapsed up to `now`, then try to take one token.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        // Out-of-order timestamps from racing callers must not rewind the clock.
        self.last_refill = self.last_refill.max(now);
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Maps client identities to their token buckets.
///
/// Buckets are created lazily on a client's first request and shared by every
/// route table generation, so a reload never resets a client's credit.
#[derive(Debug)]
pub struct AdmissionController {
    buckets: DashMap<String, SharedBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl AdmissionController {
    pub fn new(refill_rate: f64, capacity: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, f64::from(config.burst_size))
    }

    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    pub fn allow_at(&self, client: &str, now: Instant) -> bool {
        let bucket = self.bucket(client, now);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire_at(now)
    }

    /// Fetch the client's bucket, creating it if this is the first request.
    ///
    /// Concurrent first requests race on the map entry; exactly one bucket is
    /// inserted and every racer gets a handle to it.
    fn bucket(&self, client: &str, now: Instant) -> SharedBucket {
        if let Some(existing) = self.buckets.get(client) {
            return Arc::clone(existing.value());
        }

        let entry = self.buckets.entry(client.to_owned()).or_insert_with(|| {
            tracing::trace!(client = %client, "Creating token bucket");
            Arc::new(Mutex::new(TokenBucket::new_at(
                self.capacity,
                self.refill_rate,
                now,
            )))
        });
        Arc::clone(entry.value())
    }

    /// Number of clients currently tracked.
    pub fn client_count(&self) -> usize {
        self.buckets.len()
    }

    /// Time an empty bucket needs to refill completely.
    pub fn refill_horizon(&self) -> Duration {
        Duration::try_from_secs_f64(self.capacity / self.refill_rate).unwrap_or(Duration::MAX)
    }

    /// Remove buckets that have been idle for at least `ttl`.
    ///
    /// The effective TTL is never shorter than [`Self::refill_horizon`]: a
    /// bucket idle that long is full again, so dropping it is indistinguishable
    /// from keeping it.
    ///
    /// A bucket some request still holds a handle to is kept regardless, so
    /// that request's admission is never charged to a detached bucket.
    pub fn evict_idle(&self, ttl: Duration, now: Instant) -> usize {
        let ttl = ttl.max(self.refill_horizon());
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            let keep = now.saturating_duration_since(bucket.last_refill()) < ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });

        evicted
    }

    /// Run [`Self::evict_idle`] every `interval` until shutdown.
    pub fn spawn_eviction(
        self: Arc<Self>,
        interval: Duration,
        ttl: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval = ?interval,
                ttl = ?ttl.max(self.refill_horizon()),
                "Admission eviction sweep starting"
            );

            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle(ttl, Instant::now());
                        let remaining = self.client_count();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining, "Evicted idle token buckets");
                        }
                        metrics::record_evicted_clients(evicted, remaining);
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Admission eviction sweep received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

/// Identity used to key admission decisions: the peer IP address.
///
/// Forwarded-for headers are deliberately ignored; they are client-controlled.
pub fn client_identity(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Decorates a handler with an admission check.
pub struct Admitted<H> {
    controller: Arc<AdmissionController>,
    inner: H,
}

impl<H> Admitted<H> {
    pub fn new(controller: Arc<AdmissionController>, inner: H) -> Self {
        Self { controller, inner }
    }
}

impl<H: Handler> Handler for Admitted<H> {
    fn handle(&self, request: Request<Body>) -> HandlerFuture {
        let client = client_identity(&request);

        if self.controller.allow(&client) {
            return self.inner.handle(request);
        }

        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        async { (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response() }.boxed()
    }
}
