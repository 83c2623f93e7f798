use murmur_net::{ConnectionPolicy, NetError, RetryPolicy};
use std::time::Duration;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn from_connection_adds_first_attempt() {
    let policy = ConnectionPolicy {
        timeout_ms: 1_000,
        max_retries: 3,
        retry_delay_ms: 250,
    };
    let retry = RetryPolicy::from_connection(&policy);
    assert_eq!(retry.max_attempts, 4);
    assert_eq!(retry.delay, Duration::from_millis(250));
}

#[test]
fn zero_attempts_is_clamped() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    assert_eq!(RetryPolicy::once().max_attempts, 1);
}

// ── Running ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retries_until_success() {
    let retry = RetryPolicy::new(4, Duration::from_millis(100));
    let start = tokio::time::Instant::now();
    let mut calls = 0;

    let result: Result<&str, NetError> = retry
        .run(
            |attempt| {
                calls += 1;
                async move {
                    if attempt < 3 {
                        Err(NetError::Timeout)
                    } else {
                        Ok("done")
                    }
                }
            },
            |_| true,
        )
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls, 3);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn stops_after_budget() {
    let retry = RetryPolicy::new(3, Duration::from_millis(10));
    let mut calls = 0;

    let result: Result<(), NetError> = retry
        .run(
            |_| {
                calls += 1;
                async { Err(NetError::Transport("reset".into())) }
            },
            |_| true,
        )
        .await;

    assert_eq!(result.unwrap_err(), NetError::Transport("reset".into()));
    assert_eq!(calls, 3);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_fails_immediately() {
    let retry = RetryPolicy::new(5, Duration::from_secs(1));
    let mut calls = 0;

    let result: Result<(), NetError> = retry
        .run(
            |_| {
                calls += 1;
                async { Err(NetError::Http { status: 404 }) }
            },
            |e| !e.is_not_found(),
        )
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(calls, 1);
}
