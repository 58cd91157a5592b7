//! Bounded call-site retry with exponential backoff. This is the short, in-run layer;
//! anything still failing afterwards goes to the durable queue.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::model::RetryPolicy;
use crate::domain::retry::local_retry_delay_ms;
use crate::ports::random::RandomSource;

pub async fn retry_async<T, E, F, Fut, G>(
    policy: &RetryPolicy,
    rng: &G,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    G: RandomSource + ?Sized,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let rand = if policy.jitter { rng.next_f64().await } else { 1.0 };
                let delay_ms = local_retry_delay_ms(policy, attempt, rand);
                warn!(
                    what,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms,
                    error = %e,
                    "Retrying"
                );
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                attempt += 1;
            }
        }
    }
}
