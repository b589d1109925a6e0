//! Request throttling for a single scraper.
//!
//! This module provides the [`RateLimiter`] struct which enforces a minimum
//! spacing between consecutive requests issued by one
//! [`Scraper`](crate::Scraper).
//!
//! # Overview
//!
//! The limiter is configured with a requests-per-minute budget `R` and keeps
//! successive requests at least `60 / R` seconds apart. It is a fixed-spacing
//! limiter, not a sliding window: after an idle stretch the next request goes
//! out immediately, and only the one after that waits.
//!
//! All callers sharing a limiter serialize through the same last-request time,
//! so concurrent tasks using one scraper are throttled together.
//!
//! # Example
//!
//! ```
//! use scrapelib::RateLimiter;
//!
//! # async fn example() {
//! // 120 requests per minute: one request every 500ms
//! let limiter = RateLimiter::new(120);
//!
//! limiter.acquire().await; // immediate
//! limiter.acquire().await; // waits ~500ms
//!
//! limiter.set_throttled(false);
//! limiter.acquire().await; // immediate again
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative throttle delay (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Fixed-spacing rate limiter.
///
/// `RateLimiter` is `Send + Sync`; runtime toggles take `&self` so a limiter
/// shared behind `Arc` can be reconfigured while in use.
#[derive(Debug)]
pub struct RateLimiter {
    /// Configured budget; `0` means unlimited.
    requests_per_minute: AtomicU32,

    /// Runtime switch, read on every `acquire`.
    throttled: AtomicBool,

    /// Time of the last permitted request.
    /// `None` until the first throttled request (first request is immediate).
    last_request: Mutex<Option<Instant>>,

    /// Total time spent waiting, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl RateLimiter {
    /// Creates an enabled limiter allowing `requests_per_minute` requests.
    ///
    /// A budget of `0` yields a limiter that never waits.
    #[must_use]
    #[instrument]
    pub fn new(requests_per_minute: u32) -> Self {
        debug!("creating rate limiter");
        Self {
            requests_per_minute: AtomicU32::new(requests_per_minute),
            throttled: AtomicBool::new(true),
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Creates a limiter that applies no delays.
    #[must_use]
    pub fn disabled() -> Self {
        let limiter = Self::new(0);
        limiter.set_throttled(false);
        limiter
    }

    /// Returns the configured requests-per-minute budget.
    #[must_use]
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute.load(Ordering::SeqCst)
    }

    /// Returns whether the throttling switch is on.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.throttled.load(Ordering::SeqCst)
    }

    /// Turns throttling on or off. Takes effect on the next [`acquire`](Self::acquire).
    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    /// Returns whether `acquire` can currently wait at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_throttled() && self.requests_per_minute() > 0
    }

    /// Returns the minimum spacing between requests, if any.
    #[must_use]
    pub fn min_interval(&self) -> Option<Duration> {
        interval_for(self.requests_per_minute())
    }

    /// Returns the total time this limiter has made callers wait.
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::SeqCst))
    }

    /// Changes the budget and forgets the last request time, so the next
    /// request is immediate.
    #[instrument(skip(self))]
    pub async fn set_requests_per_minute(&self, requests_per_minute: u32) {
        let mut last_request_guard = self.last_request.lock().await;
        self.requests_per_minute
            .store(requests_per_minute, Ordering::SeqCst);
        *last_request_guard = None;
        debug!("rate limit updated");
    }

    /// Waits until the next request may be issued, then records it.
    ///
    /// Returns immediately when throttling is off or the budget is `0`.
    /// The first request after construction (or after
    /// [`set_requests_per_minute`](Self::set_requests_per_minute)) never waits.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        if !self.is_active() {
            return;
        }

        // Held across the sleep so concurrent callers queue behind each other.
        let mut last_request_guard = self.last_request.lock().await;

        // Settings may have changed while this caller was queued.
        if !self.is_throttled() {
            return;
        }
        let Some(interval) = self.min_interval() else {
            return;
        };

        if let Some(last_request) = *last_request_guard {
            let elapsed = last_request.elapsed();

            if elapsed < interval {
                let delay = interval.saturating_sub(elapsed);
                let cumulative = self.add_cumulative_delay(delay);

                debug!(
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "sleeping before next request"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
                    && cumulative.saturating_sub(delay) < CUMULATIVE_DELAY_WARNING_THRESHOLD
                {
                    warn!(
                        cumulative_delay_secs = cumulative.as_secs(),
                        "throttling has delayed requests for over 30s"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        } else {
            debug!("first throttled request - no delay");
        }

        *last_request_guard = Some(Instant::now());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

/// Returns the spacing `60s / requests_per_minute`, or `None` for `0`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use scrapelib::rate_limiter::interval_for;
///
/// assert_eq!(interval_for(60), Some(Duration::from_secs(1)));
/// assert_eq!(interval_for(30), Some(Duration::from_secs(2)));
/// assert_eq!(interval_for(0), None);
/// ```
#[must_use]
pub fn interval_for(requests_per_minute: u32) -> Option<Duration> {
    (requests_per_minute > 0).then(|| Duration::from_secs(60) / requests_per_minute)
}
