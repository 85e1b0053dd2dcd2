//! Cancellable retry and sleep helpers shared by the long-running workers.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// Returns `false` when the sleep was interrupted.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Delays of `2 * unit`, `4 * unit`, `8 * unit`, ... capped at 30 seconds.
pub fn backoff(unit_millis: u64, attempts: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(unit_millis)
        .max_delay(Duration::from_secs(30))
        .map(jitter)
        .take(attempts)
}

/// Runs `op` up to `attempts` times with exponential back-off in between.
///
/// The back-off sleep is interrupted by `cancel`, in which case the last
/// error is returned immediately. An in-flight attempt is never aborted.
pub async fn with_retries<T, F, Fut>(
    cancel: &CancellationToken,
    attempts: usize,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delays = backoff(125, attempts - 1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let Some(delay) = delays.next() else {
                    return Err(e.context(format!("{label} failed after {attempt} attempt(s)")));
                };
                debug!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    label, attempt, attempts, e, delay
                );
                if cancel.is_cancelled() || !sleep_or_cancel(cancel, delay).await {
                    return Err(e.context(format!("{label} cancelled")));
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let value = with_retries(&cancel, 4, "flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("transient")
            }
            Ok(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = with_retries(&cancel, 3, "always failing", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("down")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = with_retries(&cancel, 10, "cancelled", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("down")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_or_cancel(&cancel, Duration::from_secs(3600)).await);
    }
}
