use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retries `op` with exponential backoff until it succeeds, the cancellation token
/// fires, or (if `max_attempts` is `Some`) attempts are exhausted.
///
/// `initial_delay` is the delay before the *second* attempt; it doubles after every
/// failure, matching the reference keeper's `retry(delay=.., backoff=2)` combinator.
/// The cancellation token is raced against the backoff sleep so shutdown interrupts
/// a wait instead of waiting it out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    initial_delay: Duration,
    max_attempts: Option<u32>,
    cancellation: &CancellationToken,
    label: &str,
    mut op: F,
) -> Option<Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if cancellation.is_cancelled() {
            return None;
        }

        match op().await {
            Ok(value) => return Some(Ok(value)),
            Err(err) => {
                if let Some(max) = max_attempts {
                    if attempt >= max {
                        return Some(Err(err));
                    }
                }

                warn!(label, attempt, error = %err, delay_s = delay.as_secs_f64(), "retrying after error");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancellation.cancelled() => return None,
                }

                delay = delay.saturating_mul(2);
            }
        }
    }
}
