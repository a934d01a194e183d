//! Retry policies.
//!
//! There are two independent policies here. `TransportRetry` applies to every
//! idempotent API request. `ChunkRetryStrategy` applies only to the chunk
//! PUTs of a resumable upload, which bypass the API transport entirely.

use reqwest::{Method, StatusCode};
use std::cmp::min;
use std::time::Duration;

/// Statuses worth retrying during a resumable upload.
pub const CHUNK_RETRYABLE_STATUSES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Statuses worth retrying for idempotent API requests.
pub const TRANSPORT_RETRYABLE_STATUSES: &[StatusCode] = &[
    StatusCode::PAYLOAD_TOO_LARGE,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Initial base wait for chunk retries. Doubled before the first sleep.
const CHUNK_INITIAL_BASE_WAIT: Duration = Duration::from_millis(500);

/// How the transport retries idempotent requests. This uses a "builder"
/// pattern:
///
/// ```
/// use std::time::Duration;
/// use dymaxionlabs::retry::TransportRetry;
///
/// let retry = TransportRetry::default()
///     .total(5)
///     .backoff_factor(Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRetry {
    /// Maximum number of retries after the first attempt.
    total: u32,
    /// Sleep before retry `n` (1-based) is `backoff_factor * 2^(n-1)`.
    backoff_factor: Duration,
}

impl TransportRetry {
    /// How many times should we retry? Defaults to 3.
    pub fn total(mut self, total: u32) -> Self {
        self.total = total;
        self
    }

    /// The base unit of our exponential backoff. Defaults to 1 second.
    pub fn backoff_factor(mut self, backoff_factor: Duration) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// The maximum number of retries.
    pub fn get_total(&self) -> u32 {
        self.total
    }

    /// Never retry.
    pub fn disabled() -> Self {
        TransportRetry {
            total: 0,
            backoff_factor: Duration::from_secs(0),
        }
    }

    /// Only idempotent methods are retried; POST and PATCH never are.
    pub fn method_allowed(&self, method: &Method) -> bool {
        matches!(
            *method,
            Method::GET
                | Method::PUT
                | Method::DELETE
                | Method::HEAD
                | Method::OPTIONS
                | Method::TRACE
        )
    }

    /// Should we retry after receiving `status`?
    pub fn status_is_retryable(&self, status: StatusCode) -> bool {
        TRANSPORT_RETRYABLE_STATUSES.contains(&status)
    }

    /// May we make retry number `retries_so_far + 1`?
    pub fn retry_allowed(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.total
    }

    /// How long to sleep before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor * 2u32.pow(exponent)
    }
}

impl Default for TransportRetry {
    fn default() -> Self {
        TransportRetry {
            total: 3,
            backoff_factor: Duration::from_secs(1),
        }
    }
}

/// Limits on retrying a failed chunk PUT.
///
/// Both limits apply: we stop as soon as either the cumulative sleep or the
/// number of retries reaches its maximum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRetryStrategy {
    /// Cap on any single sleep.
    max_sleep: Duration,
    /// Cap on the total time spent sleeping for one chunk.
    max_cumulative_retry: Duration,
    /// Cap on the number of retries for one chunk.
    max_retries: u32,
    /// The base wait, before doubling, for the first retry.
    initial_base_wait: Duration,
}

impl ChunkRetryStrategy {
    /// Cap any single sleep. Defaults to 64 seconds.
    pub fn max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Cap the total time spent sleeping. Defaults to 10 minutes.
    pub fn max_cumulative_retry(mut self, max_cumulative_retry: Duration) -> Self {
        self.max_cumulative_retry = max_cumulative_retry;
        self
    }

    /// Cap the number of retries. Defaults to 10.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Change the starting point of the backoff. Defaults to 0.5 seconds,
    /// which makes the first sleep 1 second.
    pub fn initial_base_wait(mut self, initial_base_wait: Duration) -> Self {
        self.initial_base_wait = initial_base_wait;
        self
    }

    /// Should we retry after receiving `status`?
    pub fn status_is_retryable(&self, status: StatusCode) -> bool {
        CHUNK_RETRYABLE_STATUSES.contains(&status)
    }

    /// May we retry again, having already slept `total_sleep` over
    /// `num_retries` retries?
    pub fn retry_allowed(&self, total_sleep: Duration, num_retries: u32) -> bool {
        total_sleep < self.max_cumulative_retry && num_retries < self.max_retries
    }

    /// Start a new sequence of waits.
    pub(crate) fn backoff(&self) -> ChunkBackoff {
        ChunkBackoff {
            base_wait: self.initial_base_wait,
            max_sleep: self.max_sleep,
        }
    }
}

impl Default for ChunkRetryStrategy {
    fn default() -> Self {
        ChunkRetryStrategy {
            max_sleep: Duration::from_secs(64),
            max_cumulative_retry: Duration::from_secs(600),
            max_retries: 10,
            initial_base_wait: CHUNK_INITIAL_BASE_WAIT,
        }
    }
}

/// Jitter-free doubling sleeps for one chunk.
#[derive(Debug)]
pub(crate) struct ChunkBackoff {
    base_wait: Duration,
    max_sleep: Duration,
}

impl ChunkBackoff {
    /// Double the base wait and return how long to sleep next.
    pub(crate) fn next_wait(&mut self) -> Duration {
        self.base_wait = min(self.base_wait * 2, self.max_sleep);
        self.base_wait
    }
}

#[test]
fn transport_backoff_doubles() {
    let retry = TransportRetry::default();
    assert_eq!(retry.backoff(1), Duration::from_secs(1));
    assert_eq!(retry.backoff(2), Duration::from_secs(2));
    assert_eq!(retry.backoff(3), Duration::from_secs(4));
    assert!(retry.retry_allowed(2));
    assert!(!retry.retry_allowed(3));
}

#[test]
fn transport_only_retries_idempotent_methods() {
    let retry = TransportRetry::default();
    assert!(retry.method_allowed(&Method::GET));
    assert!(retry.method_allowed(&Method::PUT));
    assert!(retry.method_allowed(&Method::DELETE));
    assert!(!retry.method_allowed(&Method::POST));
    assert!(!retry.method_allowed(&Method::PATCH));
    assert!(retry.status_is_retryable(StatusCode::PAYLOAD_TOO_LARGE));
    assert!(!retry.status_is_retryable(StatusCode::NOT_FOUND));
}

#[test]
fn chunk_backoff_starts_at_one_second_and_caps() {
    let strategy = ChunkRetryStrategy::default().max_sleep(Duration::from_secs(4));
    let mut backoff = strategy.backoff();
    let waits: Vec<_> = (0..5).map(|_| backoff.next_wait()).collect();
    assert_eq!(
        waits,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4),
            Duration::from_secs(4),
        ]
    );
}

#[test]
fn chunk_retry_is_bounded_by_time_and_count() {
    let strategy = ChunkRetryStrategy::default()
        .max_retries(3)
        .max_cumulative_retry(Duration::from_secs(10));
    assert!(strategy.retry_allowed(Duration::from_secs(0), 0));
    assert!(!strategy.retry_allowed(Duration::from_secs(0), 3));
    assert!(!strategy.retry_allowed(Duration::from_secs(10), 1));
    assert!(!strategy.status_is_retryable(StatusCode::PAYLOAD_TOO_LARGE));
    assert!(strategy.status_is_retryable(StatusCode::SERVICE_UNAVAILABLE));
}
