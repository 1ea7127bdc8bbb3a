//! A single bounded exponential-backoff-with-jitter strategy, reused across
//! every store and background worker in the core rather than re-implemented
//! per call site.

use std::{
    cmp,
    ops::Div,
    time::{
        Duration,
        Instant,
    },
};

use errors::ErrorMetadataAnyhowExt;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial_backoff: Duration,
    max_backoff: Duration,
    num_failures: u32,
}

impl Backoff {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            num_failures: 0,
        }
    }

    pub fn reset(&mut self) {
        self.num_failures = 0;
    }

    /// Ensures that `fail` will return the max_backoff value the next time
    /// it is called.
    pub fn set_max(&mut self) {
        self.num_failures = u32::MAX.div(2);
    }

    pub fn fail(&mut self, rng: &mut impl Rng) -> Duration {
        // See https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
        let p = 2u32.checked_pow(self.num_failures).unwrap_or(u32::MAX);
        self.num_failures += 1;
        let jitter = rng.random::<f32>();
        let backoff = self
            .initial_backoff
            .checked_mul(p)
            .unwrap_or(self.max_backoff);
        cmp::min(backoff, self.max_backoff).mul_f32(jitter)
    }

    pub fn failures(&self) -> u32 {
        self.num_failures
    }
}

/// A retry budget: caps the wall-clock time spent retrying a single logical
/// operation rather than the number of attempts, matching §5's "every
/// storage operation uses a bounded deadline... retries use capped
/// exponential backoff (initial 1s, factor 2, max a quarter of deadline,
/// total equal to deadline)".
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    deadline: Duration,
}

impl RetryBudget {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(Duration::from_secs(1), self.deadline / 4)
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Runs `op` until it succeeds, the budget's deadline elapses, or `op`
/// returns a non-retriable error. The single retry loop every store's write
/// path and every background poller shares, rather than each reinventing a
/// `loop { ... }` around its own backoff.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &'static str,
    budget: &RetryBudget,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let start = Instant::now();
    let mut backoff = budget.backoff();
    let mut rng = rand::rng();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && start.elapsed() < budget.deadline() => {
                let delay = backoff.fail(&mut rng);
                tracing::warn!(
                    "{name} failed (attempt {}), retrying in {}ms: {e:#}",
                    backoff.failures(),
                    delay.as_millis(),
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{
            AtomicU32,
            Ordering,
        },
        time::Duration,
    };

    use errors::ErrorMetadata;
    use rand::rngs::mock::StepRng;

    use super::{
        retry_with_backoff,
        Backoff,
        RetryBudget,
    };

    #[test]
    fn fail_never_exceeds_max() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(100));
        let mut rng = StepRng::new(u64::MAX, 0);
        for _ in 0..64 {
            let delay = backoff.fail(&mut rng);
            assert!(delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn reset_restarts_growth() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(30));
        let mut rng = StepRng::new(0, 0);
        backoff.fail(&mut rng);
        backoff.fail(&mut rng);
        assert_eq!(backoff.failures(), 2);
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let budget = RetryBudget::new(Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff("test-op", &budget, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::Error::new(ErrorMetadata::transient(
                    "retry-me",
                    "not ready yet",
                )))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_errors_surface_immediately() {
        let budget = RetryBudget::new(Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_with_backoff("test-op", &budget, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::Error::new(ErrorMetadata::not_found(
                "missing",
                "no such row",
            )))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
