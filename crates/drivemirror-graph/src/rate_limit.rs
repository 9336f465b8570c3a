//! Rate limiting and adaptive throttling for Microsoft Graph API
//!
//! Provides optional proactive pacing so a run stays under the tenant's
//! request budget instead of relying on 429 responses alone.
//!
//! ## Architecture
//!
//! - [`AdaptiveRateLimiter`]: token bucket whose effective capacity halves on
//!   each throttle event and recovers by 5% every 100 successes
//! - [`parse_retry_after`]: `Retry-After` header parsing shared with the
//!   request executor
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_graph::rate_limit::AdaptiveRateLimiter;
//!
//! # async fn example() {
//! let limiter = AdaptiveRateLimiter::new(20, 5.0);
//! limiter.acquire().await;
//! // ... make API call ...
//! limiter.on_success();
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Longest `Retry-After` we are willing to honour (one hour)
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Successes between two capacity recovery steps
const RECOVERY_INTERVAL: u64 = 100;

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// Mutable bucket state, protected by a single mutex
#[derive(Debug)]
struct BucketState {
    /// Current number of available tokens (fractional for smooth refill)
    tokens: f64,
    /// Timestamp of the last refill calculation
    last_refill: Instant,
    /// Capacity after adaptive adjustments
    effective_capacity: u32,
    /// Successes since the last throttle or recovery step
    successes: u64,
}

/// Token bucket limiter shared by every request of a run
///
/// Thread-safe and designed to be shared via `Arc<AdaptiveRateLimiter>`.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    /// Configured maximum number of tokens
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl AdaptiveRateLimiter {
    /// Creates a full bucket with the given capacity and refill rate
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(state.last_refill).as_secs_f64();

        if elapsed_secs > 0.0 {
            state.tokens =
                (state.tokens + elapsed_secs * refill_rate).min(state.effective_capacity as f64);
            state.last_refill = now;
        }
    }

    /// Takes one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait until a token becomes available
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);

        if state.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            let ceiling = Duration::from_secs(MAX_RETRY_AFTER_SECS);
            Duration::try_from_secs_f64((1.0 - state.tokens) / self.refill_rate)
                .map_or(ceiling, |wait| wait.min(ceiling))
        } else {
            Duration::from_secs(MAX_RETRY_AFTER_SECS)
        }
    }

    /// Waits until a token is available and takes it
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = self.time_until_available().max(Duration::from_millis(10));
            debug!(wait_ms = wait.as_millis(), "No tokens available, waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    /// Records a successful call; every 100 successes restores 5% of capacity
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.successes += 1;

        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity {
            let increase = (state.effective_capacity as f64 * 0.05).max(1.0) as u32;
            let new_cap = (state.effective_capacity + increase).min(self.capacity);
            debug!(
                old_capacity = state.effective_capacity,
                new_capacity = new_cap,
                "Adaptive recovery: increasing bucket capacity"
            );
            state.effective_capacity = new_cap;
        }
    }

    /// Records a 429 and halves the effective capacity (minimum 1)
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(state.effective_capacity as f64);
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttle detected: reducing bucket capacity by 50%"
        );
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        self.lock().effective_capacity
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Parses a Retry-After header value into a Duration.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") - parsed as seconds from now
///
/// Falls back to the default duration if parsing fails or the value is more
/// than an hour away.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        if seconds <= MAX_RETRY_AFTER_SECS {
            return Duration::from_secs(seconds);
        }
        warn!(value, "Retry-After exceeds one hour, using default");
        return default;
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= MAX_RETRY_AFTER_SECS)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
