/// Bounded retry with exponential backoff and jitter.
///
/// Applied to connection establishment only (Redis connect, startup pings),
/// never to individual RPC calls: a failed RPC on a synchronous path is
/// surfaced to the caller, and the consumer relies on queue redelivery.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Execute a fallible async operation, retrying on failure until the retry
/// budget is exhausted. Returns the last error when it is.
pub async fn with_backoff<F, Fut, T, E>(config: &RetryConfig, what: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    warn!("{}: giving up after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }

                let delay = apply_jitter(backoff, config.jitter);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    what, attempt, config.max_retries, e, delay
                );
                tokio::time::sleep(delay).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * config.backoff_multiplier)
                        .min(config.max_backoff.as_millis() as f64)) as u64,
                );
            }
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
