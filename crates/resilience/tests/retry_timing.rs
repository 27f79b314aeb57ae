//! Integration tests for retry timing and attempt accounting
//!
//! All timing runs on a paused tokio clock, so elapsed times are exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tether_resilience::prelude::*;
use tether_resilience::{RecordingSink, with_default_retry};
use tokio::time::Instant;

fn recording_executor() -> (Arc<RecordingSink>, RetryExecutor) {
    let sink = Arc::new(RecordingSink::new());
    let executor = RetryExecutor::new(Arc::new(Classifier::default()), sink.clone());
    (sink, executor)
}

/// Test: a persistent network failure is attempted max_retries + 1 times
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn network_failure_exhausts_all_attempts_with_backoff() {
    let start = Instant::now();
    let offsets = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&offsets);

    let result = with_retry(
        move || {
            seen.lock().push(start.elapsed());
            async { Err::<(), _>("TypeError: Failed to fetch") }
        },
        3,
        None,
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Network);
    assert_eq!(
        *offsets.lock(),
        vec![
            Duration::ZERO,
            Duration::from_millis(1000),
            Duration::from_millis(3000),
            Duration::from_millis(7000),
        ]
    );
    assert_eq!(start.elapsed(), Duration::from_millis(7000));
}

/// Test: the default retry count is three
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn default_retry_count_is_three() {
    let calls = AtomicU32::new(0);

    let _ = with_default_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RawFailure::from_status(503)) }
        },
        None,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// Test: non-retryable failures stop after one attempt with no delay
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn bad_credentials_are_not_retried() {
    let (sink, executor) = recording_executor();
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let error = executor
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("Invalid login credentials") }
            },
            3,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(error.kind(), ErrorKind::Authentication);
    assert_eq!(sink.len(), 1);
}

/// Test: fail twice, then succeed
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn transient_failures_then_success() {
    let (sink, executor) = recording_executor();
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let value = executor
        .run(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RawFailure::transport("connection reset"))
                    } else {
                        Ok("payload")
                    }
                }
            },
            3,
            None,
        )
        .await
        .expect("third attempt succeeds");

    assert_eq!(value, "payload");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(3000));

    let reports = sink.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.error.kind() == ErrorKind::Network));
}

/// Test: a server error that turns into a client error stops retrying
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn retry_decision_is_made_per_attempt() {
    let (sink, executor) = recording_executor();
    let calls = AtomicU32::new(0);

    let error = executor
        .run(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let status = if n == 0 { 502 } else { 404 };
                    Err::<(), _>(RawFailure::from_status(status))
                }
            },
            5,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(error.status(), Some(404));
    assert_eq!(sink.len(), 2);
}

/// Test: custom backoff schedule is honored and capped
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn custom_schedule_caps_delays() {
    let (_, executor) = recording_executor();
    let executor = executor.with_backoff(tether_resilience::BackoffSchedule::new(
        Duration::from_millis(100),
        Duration::from_millis(250),
    ));
    let start = Instant::now();

    let _ = executor
        .run(|| async { Err::<(), _>("Failed to fetch") }, 4, None)
        .await;

    // 100 + 200 + 250 + 250
    assert_eq!(start.elapsed(), Duration::from_millis(800));
}

/// Test: io errors are classified through their kind
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn io_timeouts_are_retried() {
    let calls = AtomicU32::new(0);

    let _ = with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "deadline elapsed",
                ))
            }
        },
        1,
        None,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
