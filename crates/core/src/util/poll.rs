//! Fixed-interval polling with an upper bound on total wait.
//!
//! Used to wait on external jobs (e.g. facial analysis of an uploaded video)
//! without blocking forever. Probe errors are returned immediately; only a
//! "not finished yet" answer is retried.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between probes.
    pub interval: Duration,
    /// Total time budget, measured from the first probe.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    fn next_delay(&self, waited: Duration) -> Duration {
        self.interval.min(self.max_wait.saturating_sub(waited))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PollError<E> {
    #[error("probe failed: {0}")]
    Probe(E),
    #[error("still pending after {waited:?}")]
    TimedOut { waited: Duration },
}

/// Calls `probe` until it returns `Ready`, sleeping `config.interval` between calls.
pub async fn poll_until<F, Fut, T, E>(config: &PollConfig, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match probe().await.map_err(PollError::Probe)? {
            PollStatus::Ready(value) => {
                if attempt > 1 {
                    debug!(attempt, waited = ?started.elapsed(), "poll completed");
                }
                return Ok(value);
            }
            PollStatus::Pending => {
                let waited = started.elapsed();
                if waited >= config.max_wait {
                    return Err(PollError::TimedOut { waited });
                }
                let delay = config.next_delay(waited);
                debug!(attempt, ?delay, "still pending, polling again");
                sleep(delay).await;
            }
        }
    }
}
