//! Utilities for waiting, timeouts and error retries.

use std::fmt::Display;
use std::future::Future;
use std::result;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::errors::*;

/// How should we back off between polls?
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BackoffType {
    /// Use the same interval for each retry.
    Linear,
    /// Double the interval after each poll.
    Exponential,
}

/// Options controlling how long we wait and what makes us give up.
/// This uses a "builder" pattern, so you can write:
///
/// ```
/// use std::time::Duration;
/// use dymaxionlabs::wait::WaitOptions;
///
/// let options = WaitOptions::default()
///     .timeout(Duration::from_secs(120))
///     .allowed_errors(5);
/// ```
#[derive(Clone, Debug)]
pub struct WaitOptions {
    /// Give up once this much time has passed. The deadline is checked
    /// before each sleep, so a wait may overrun it by one interval.
    timeout: Option<Duration>,

    /// How long to wait between polls.
    retry_interval: Duration,

    /// What kind of back-off should we use?
    backoff_type: BackoffType,

    /// How many temporary errors are we allowed before giving up?
    allowed_errors: u16,

    /// Stop waiting early when this is cancelled.
    cancellation_token: Option<CancellationToken>,
}

impl WaitOptions {
    /// Set an optional timeout after which to abandon this `wait`.
    pub fn timeout<D: Into<Option<Duration>>>(mut self, timeout: D) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// How long should we wait between polls? Defaults to 10 seconds.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Should we use linear (default) or exponential backoff?
    pub fn backoff_type(mut self, backoff_type: BackoffType) -> Self {
        self.backoff_type = backoff_type;
        self
    }

    /// How many consecutive errors should be ignored before giving up? A
    /// successful poll resets the count, so a wait of several hours survives
    /// scattered dropped connections and slow responses.
    pub fn allowed_errors(mut self, count: u16) -> Self {
        self.allowed_errors = count;
        self
    }

    /// Abandon the wait with `Error::WaitCancelled` once `token` is
    /// cancelled.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retry_interval: Duration::from_secs(10),
            backoff_type: BackoffType::Linear,
            allowed_errors: 2,
            cancellation_token: None,
        }
    }
}

/// Return this value from a `wait` callback.
pub enum WaitStatus<T, E> {
    /// The task has finished.
    Finished(T),

    /// The task hasn't finished yet, so wait a while and try again.
    Waiting,

    /// The task has failed, but the failure is believed to be temporary.
    FailedTemporarily(E),

    /// The task has failed, and we don't believe that it will ever succeed.
    FailedPermanently(E),
}

/// Try `e`, and if it fails, allow our `wait` function to be retried.
#[macro_export]
macro_rules! try_with_temporary_failure {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return $crate::wait::WaitStatus::FailedTemporarily(e.into()),
        }
    };
}

/// Try `e`, and if it fails, do not allow our `wait` function to be retried.
#[macro_export]
macro_rules! try_with_permanent_failure {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return $crate::wait::WaitStatus::FailedPermanently(e.into()),
        }
    };
}

/// Call `f` repeatedly, wait for it to return `WaitStatus::Finished`, an error,
/// or a timeout. Honors `WaitOptions`.
///
/// ```
/// # use dymaxionlabs::wait::{wait, WaitOptions, WaitStatus};
/// # use dymaxionlabs::Error;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = wait::<_, Error, _, _>(&WaitOptions::default(), || async {
///     WaitStatus::Finished("my value")
/// })
/// .await
/// .expect("an error occured while waiting");
///
/// assert_eq!(value, "my value");
/// # }
/// ```
///
/// If you return `WaitStatus::Waiting` instead, this function will sleep
/// for the retry interval, and then try again.
pub async fn wait<T, E, F, Fut>(options: &WaitOptions, mut f: F) -> result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WaitStatus<T, E>>,
    E: Display,
    Error: Into<E>,
{
    let started = Instant::now();
    let mut retry_interval = options.retry_interval;
    trace!(
        "waiting with timeout {:?}, initial interval {:?}",
        options.timeout,
        retry_interval
    );
    let mut errors_seen = 0;
    loop {
        // Call the function we're waiting on.
        match f().await {
            WaitStatus::Finished(value) => {
                trace!("wait finished successfully");
                return Ok(value);
            }
            WaitStatus::Waiting => {
                trace!("waiting some more");
                errors_seen = 0;
            }
            WaitStatus::FailedTemporarily(ref e)
                if errors_seen < options.allowed_errors =>
            {
                errors_seen += 1;
                error!(
                    "got error, will retry ({}/{}): {}",
                    errors_seen, options.allowed_errors, e,
                );
            }
            WaitStatus::FailedTemporarily(err) => {
                trace!("too many temporary failures, giving up on wait: {}", err);
                return Err(err);
            }
            WaitStatus::FailedPermanently(err) => {
                trace!("permanent failure, giving up on wait: {}", err);
                return Err(err);
            }
        }

        // Check our deadline (if we have one) before going back to sleep.
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                trace!("waited {:?} of {:?}, ending wait", elapsed, timeout);
                return Err(Error::Timeout {}.into());
            }
        }

        // Sleep until our next call, unless someone cancels us first.
        match options.cancellation_token {
            Some(ref token) => {
                tokio::select! {
                    _ = sleep(retry_interval) => {}
                    _ = token.cancelled() => {
                        trace!("wait cancelled");
                        return Err(Error::WaitCancelled {}.into());
                    }
                }
            }
            None => sleep(retry_interval).await,
        }

        // Update retry interval.
        match options.backoff_type {
            BackoffType::Linear => {}
            BackoffType::Exponential => {
                retry_interval *= 2;
                trace!("next retry doubled to {:?}", retry_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use url::Url;

    fn fast() -> WaitOptions {
        WaitOptions::default().retry_interval(Duration::from_millis(5))
    }

    fn server_error() -> Error {
        let url = Url::parse("https://api.dymaxionlabs.com/tasks/1/").unwrap();
        Error::from_status(&url, StatusCode::SERVICE_UNAVAILABLE, String::new())
    }

    #[tokio::test]
    async fn polls_until_finished() {
        let mut calls = 0;
        let value: Result<u32> = wait(&fast(), || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    WaitStatus::Waiting
                } else {
                    WaitStatus::Finished(n)
                }
            }
        })
        .await;
        assert_eq!(value.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn tolerates_allowed_temporary_errors() {
        let mut calls = 0;
        let value: Result<&str> = wait(&fast().allowed_errors(2), || {
            calls += 1;
            let n = calls;
            async move {
                if n <= 2 {
                    WaitStatus::FailedTemporarily(server_error())
                } else {
                    WaitStatus::Finished("done")
                }
            }
        })
        .await;
        assert_eq!(value.unwrap(), "done");
    }

    #[tokio::test]
    async fn gives_up_after_too_many_temporary_errors() {
        let mut calls = 0;
        let value: Result<()> = wait(&fast().allowed_errors(1), || {
            calls += 1;
            async { WaitStatus::FailedTemporarily(server_error()) }
        })
        .await;
        assert!(matches!(value, Err(Error::InternalServerError { .. })));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn successful_polls_reset_the_error_count() {
        let mut calls = 0;
        let value: Result<u32> = wait(&fast().allowed_errors(1), || {
            calls += 1;
            let n = calls;
            async move {
                match n {
                    1 | 3 | 5 => WaitStatus::FailedTemporarily(server_error()),
                    2 | 4 => WaitStatus::Waiting,
                    _ => WaitStatus::Finished(n),
                }
            }
        })
        .await;
        assert_eq!(value.unwrap(), 6);
    }

    #[tokio::test]
    async fn permanent_errors_end_the_wait() {
        let mut calls = 0;
        let value: Result<()> = wait(&fast(), || {
            calls += 1;
            async { WaitStatus::FailedPermanently(Error::invalid_argument("nope")) }
        })
        .await;
        assert!(matches!(value, Err(Error::InvalidArgument { .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn times_out() {
        let options = fast().timeout(Duration::from_millis(30));
        let value: Result<()> = wait(&options, || async { WaitStatus::Waiting }).await;
        assert!(matches!(value, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn can_be_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let options = WaitOptions::default()
            .retry_interval(Duration::from_secs(3600))
            .cancellation_token(token);
        let value: Result<()> = wait(&options, || async { WaitStatus::Waiting }).await;
        assert!(matches!(value, Err(Error::WaitCancelled { .. })));
    }
}
