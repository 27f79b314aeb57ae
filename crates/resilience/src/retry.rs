//! Retry with capped exponential backoff
//!
//! [`RetryExecutor::run`] invokes an async operation until it succeeds, the
//! attempt limit is reached, or a failure is classified as not worth
//! retrying. Every failed attempt is classified and reported before the
//! retry decision is made.
//!
//! With `max_retries = 3` and the default schedule, an operation that keeps
//! failing with a network error is attempted 4 times and sleeps
//! 1s + 2s + 4s in between.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classify::{BackoffSchedule, Classifier, should_retry};
use crate::core::constants::DEFAULT_MAX_RETRIES;
use crate::core::{ClassifiedError, ErrorContext, RawFailure, RetryConfig};
use crate::report::{ReportSink, TracingSink, tags};

/// State handed to callbacks after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based number of the attempt that just failed.
    pub attempt_number: u32,
    /// `max_retries + 1`.
    pub max_attempts: u32,
    /// Classification of the failure.
    pub last_error: ClassifiedError,
}

impl RetryAttempt {
    /// Whether this was the last permitted attempt.
    pub fn is_final(&self) -> bool {
        self.attempt_number >= self.max_attempts
    }
}

type Condition = Arc<dyn Fn(&ClassifiedError) -> bool + Send + Sync>;
type OnRetry = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Runs operations with retry.
///
/// Cheap to clone; clones share classifier, sink and callbacks.
#[derive(Clone)]
pub struct RetryExecutor {
    classifier: Arc<Classifier>,
    sink: Arc<dyn ReportSink>,
    backoff: BackoffSchedule,
    enabled: bool,
    condition: Option<Condition>,
    on_retry: Option<OnRetry>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("backoff", &self.backoff)
            .field("enabled", &self.enabled)
            .field("custom_condition", &self.condition.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(Classifier::default()), Arc::new(TracingSink))
    }
}

impl RetryExecutor {
    /// Executor with the default backoff schedule.
    pub fn new(classifier: Arc<Classifier>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            classifier,
            sink,
            backoff: BackoffSchedule::default(),
            enabled: true,
            condition: None,
            on_retry: None,
        }
    }

    /// Executor following a [`RetryConfig`].
    pub fn from_config(
        config: &RetryConfig,
        classifier: Arc<Classifier>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self::new(classifier, sink)
            .with_backoff(BackoffSchedule::new(config.base_delay, config.max_delay))
            .with_enabled(config.enabled)
    }

    /// Replace the backoff schedule.
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// When disabled every run is a single attempt.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Decide retryability with `condition` instead of [`should_retry`].
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ClassifiedError) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Called before each backoff sleep.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryAttempt) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// The backoff schedule in use.
    pub fn backoff(&self) -> BackoffSchedule {
        self.backoff
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Run `operation`, retrying up to `max_retries` times.
    ///
    /// Returns the first success, or the classification of the last failure.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
        context: Option<&ErrorContext>,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        let max_retries = if self.enabled { max_retries } else { 0 };
        let max_attempts = max_retries.saturating_add(1);
        let mut attempt_number: u32 = 1;

        loop {
            debug!(attempt_number, max_attempts, "starting attempt");

            let failure = match operation().await {
                Ok(value) => {
                    if attempt_number > 1 {
                        info!(attempts = attempt_number, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let attempt = RetryAttempt {
                attempt_number,
                max_attempts,
                last_error: self.classifier.classify(failure, context),
            };
            let will_retry = !attempt.is_final() && self.is_retryable(&attempt.last_error);
            self.report(&attempt, will_retry);

            if !will_retry {
                warn!(
                    attempts = attempt_number,
                    kind = %attempt.last_error.kind(),
                    error_id = %attempt.last_error.id(),
                    "giving up: {}",
                    attempt.last_error.raw_message()
                );
                return Err(attempt.last_error);
            }

            let delay = self.backoff.delay(attempt_number - 1);
            if let Some(callback) = &self.on_retry {
                callback(&attempt);
            }
            debug!(
                attempt_number,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, backing off"
            );
            sleep(delay).await;
            attempt_number += 1;
        }
    }

    fn is_retryable(&self, error: &ClassifiedError) -> bool {
        match &self.condition {
            Some(condition) => condition(error),
            None => should_retry(error),
        }
    }

    fn report(&self, attempt: &RetryAttempt, will_retry: bool) {
        let tags = ErrorContext::new()
            .with(tags::STAGE, "attempt")
            .with(tags::ATTEMPT, attempt.attempt_number)
            .with(tags::MAX_ATTEMPTS, attempt.max_attempts)
            .with(tags::WILL_RETRY, will_retry);
        self.sink.report(&attempt.last_error, &tags);
    }
}

static DEFAULT_EXECUTOR: LazyLock<RetryExecutor> = LazyLock::new(RetryExecutor::default);

/// Retry with the default classifier, schedule and tracing sink.
///
/// Pass [`DEFAULT_MAX_RETRIES`] when the caller has no preference.
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    max_retries: u32,
    context: Option<&ErrorContext>,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawFailure>,
{
    DEFAULT_EXECUTOR.run(operation, max_retries, context).await
}

/// [`with_retry`] with the default retry count.
pub async fn with_default_retry<T, E, F, Fut>(
    operation: F,
    context: Option<&ErrorContext>,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawFailure>,
{
    with_retry(operation, DEFAULT_MAX_RETRIES, context).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::report::RecordingSink;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor(sink: Arc<RecordingSink>) -> RetryExecutor {
        RetryExecutor::new(Arc::new(Classifier::default()), sink)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn succeeds_first_time_without_reports() {
        let sink = Arc::new(RecordingSink::new());
        let result = executor(sink.clone())
            .run(|| async { Ok::<_, RawFailure>(7) }, 3, None)
            .await;

        assert_eq!(result, Ok(7));
        assert!(sink.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let sink = Arc::new(RecordingSink::new());
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = executor(sink.clone())
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("Failed to fetch") }
                },
                0,
                None,
            )
            .await;

        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::Network));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn disabled_executor_never_retries() {
        let sink = Arc::new(RecordingSink::new());
        let calls = AtomicU32::new(0);

        let _ = executor(sink)
            .with_enabled(false)
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("Failed to fetch") }
                },
                5,
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn custom_condition_overrides_classification() {
        let sink = Arc::new(RecordingSink::new());
        let calls = AtomicU32::new(0);

        let _ = executor(sink)
            .with_condition(|e| e.kind() == ErrorKind::Validation)
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("Field is required") }
                },
                2,
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn on_retry_sees_each_failed_attempt_before_sleeping() {
        let sink = Arc::new(RecordingSink::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let _ = executor(sink.clone())
            .on_retry(move |attempt| recorder.lock().push(attempt.attempt_number))
            .run(|| async { Err::<(), _>("Failed to fetch") }, 2, None)
            .await;

        assert_eq!(*seen.lock(), vec![1, 2]);

        let reports = sink.reports();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].tags.get(tags::WILL_RETRY), Some(&true.into()));
        assert_eq!(reports[2].tags.get(tags::WILL_RETRY), Some(&false.into()));
        assert_eq!(reports[2].tags.get(tags::ATTEMPT), Some(&3.into()));
        assert_eq!(reports[2].tags.get(tags::MAX_ATTEMPTS), Some(&3.into()));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn context_reaches_reported_errors() {
        let sink = Arc::new(RecordingSink::new());
        let context = ErrorContext::new().with("component", "upload");

        let err = executor(sink.clone())
            .run(|| async { Err::<(), _>("Field is required") }, 3, Some(&context))
            .await
            .unwrap_err();

        assert_eq!(err.context().get_str("component"), Some("upload"));
        assert_eq!(sink.reports()[0].error.id(), err.id());
    }
}
