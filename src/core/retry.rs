//! # Retry runner: bounded attempts with linear backoff.
//!
//! Drives one operation through up to `policy.total_attempts()` attempts.
//!
//! ## Flow
//! ```text
//! loop {
//!   ├─► op(token) ─────► Ok(v)          → return Ok(v)
//!   │                 └► Err(Canceled)  → return Err(Canceled)
//!   │                 └► Err(Failed(f)) ─┐
//!   │                                    ├─ last attempt? → publish RetryExhausted, return Err(Failed(f))
//!   │                                    └─ publish RetryScheduled{ delay = base × (n + 1) }
//!   └─► sleep(delay) (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** (never concurrent for one runner)
//! - Only the **last** failure is returned; earlier ones are reported on the bus and discarded
//! - Cancellation is checked at every suspension point (attempt, backoff sleep)
//!   and returned as [`TaskError::Canceled`], never as a failure

use std::future::Future;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TaskError,
    events::{Bus, Event, EventKind},
    policies::RetryPolicy,
};

/// Runs `op` under `policy` until it succeeds, the attempts run out, or `token` is cancelled.
///
/// `key` only labels the published events.
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    key: Option<&str>,
    bus: &Bus,
    token: &CancellationToken,
    mut op: F,
) -> Result<T, TaskError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let mut attempt: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Err(TaskError::Canceled);
        }

        let res = select! {
            biased;
            _ = token.cancelled() => return Err(TaskError::Canceled),
            res = op(token.clone()) => res,
        };

        let failure = match res {
            Ok(value) => return Ok(value),
            Err(TaskError::Canceled) => return Err(TaskError::Canceled),
            Err(TaskError::Failed(failure)) => failure,
        };

        if !policy.has_next(attempt) {
            bus.publish(
                Event::new(EventKind::RetryExhausted)
                    .with_key_opt(key)
                    .with_attempt(attempt.saturating_add(1))
                    .with_reason(failure.to_string()),
            );
            return Err(TaskError::Failed(failure));
        }

        let delay = policy.delay_after(attempt);
        bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_key_opt(key)
                .with_attempt(attempt.saturating_add(1))
                .with_delay(delay)
                .with_reason(failure.to_string()),
        );

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => {}
            _ = token.cancelled() => return Err(TaskError::Canceled),
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::error::OperationFailure;

    fn policy(retries: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(base_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let bus = Bus::new(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let res = run_with_retry(policy(3, 100), None, &bus, &token, |_ctx| {
            let calls = Arc::clone(&calls);
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(TaskError::failed("flaky")),
                    _ => Ok("done"),
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_returns_last_failure_only() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let res: Result<(), _> = run_with_retry(policy(2, 10), Some("k"), &bus, &token, |_ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(TaskError::from(OperationFailure::new(format!("attempt {n}")).with_code(500))) }
        })
        .await;

        match res {
            Err(TaskError::Failed(f)) => {
                assert_eq!(f.message(), Some("attempt 3"));
                assert_eq!(f.code(), Some(500));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| (e.kind, e.attempt))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::RetryScheduled, Some(1)),
                (EventKind::RetryScheduled, Some(2)),
                (EventKind::RetryExhausted, Some(3)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_grow_linearly() {
        let bus = Bus::new(16);
        let token = CancellationToken::new();
        let start = Instant::now();
        let mut seen = Vec::new();

        let _: Result<(), _> = run_with_retry(policy(3, 1000), None, &bus, &token, |_ctx| {
            seen.push(start.elapsed().as_millis());
            async { Err(TaskError::failed("down")) }
        })
        .await;

        assert_eq!(seen.len(), 4);
        for (got, want) in seen.iter().zip([0u128, 1000, 3000, 6000]) {
            assert!(got.abs_diff(want) <= 5, "attempt at {got}ms, expected ~{want}ms");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts() {
        let bus = Bus::new(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let res: Result<(), _> = run_with_retry(policy(5, 1000), None, &bus, &token, |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TaskError::failed("down")) }
        })
        .await;

        assert!(matches!(res, Err(TaskError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn canceled_result_is_not_retried() {
        let bus = Bus::new(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let res: Result<(), _> = run_with_retry(policy(5, 1), None, &bus, &token, |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TaskError::Canceled) }
        })
        .await;

        assert!(matches!(res, Err(TaskError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
