use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Runs `op` up to `max_attempts` times, doubling the delay after each
/// failure (`base_delay`, `2 * base_delay`, ...). Returns the last error
/// once attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
    }
    op(max_attempts).await
}
