//! Bounded, tick-counted waits.
//!
//! Every wait in the manager has the same shape: an optional grace sleep,
//! then up to `max_attempts` probes separated by a fixed interval. A
//! [`RetryPolicy`] captures the numbers and [`RetryPolicy::run`] drives the
//! loop, so tests can shrink or replay the schedule in virtual time.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, WardenError};

/// Outcome of one probe.
#[derive(Debug)]
pub enum Tick<T> {
    /// Not ready yet, try again after the interval.
    Continue,
    /// Finished with a value.
    Done(T),
    /// Give up immediately with an error.
    Abort(WardenError),
}

/// Grace delay plus a fixed number of evenly spaced attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    grace: Duration,
    interval: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy without grace delay.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            grace: Duration::ZERO,
            interval,
            max_attempts,
        }
    }

    /// Sets the delay before the first attempt.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the first attempt.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Scheduled time of `attempt` (1-based) measured from the start of the wait.
    #[must_use]
    pub fn elapsed_at(&self, attempt: u32) -> Duration {
        self.grace + self.interval * attempt.saturating_sub(1)
    }

    /// Total time the policy may wait before giving up.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.elapsed_at(self.max_attempts)
    }

    /// Runs `probe` until it finishes or the budget is spent.
    ///
    /// Returns `Ok(None)` when every attempt answered [`Tick::Continue`].
    pub async fn run<T, F, Fut>(&self, mut probe: F) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Tick<T>>,
    {
        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }
        for attempt in 1..=self.max_attempts {
            match probe(attempt).await {
                Tick::Done(value) => return Ok(Some(value)),
                Tick::Abort(err) => return Err(err),
                Tick::Continue => {}
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        tracing::debug!(
            attempts = self.max_attempts,
            budget = ?self.budget(),
            "retry budget exhausted"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_elapsed_schedule() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 240).with_grace(Duration::from_secs(10));
        assert_eq!(policy.elapsed_at(1), Duration::from_secs(10));
        assert_eq!(policy.elapsed_at(51), Duration::from_secs(60));
        assert_eq!(policy.budget(), Duration::from_secs(249));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_finishes_on_done() {
        let policy = RetryPolicy::new(Duration::from_secs(10), 24).with_grace(Duration::from_secs(15));
        let started = tokio::time::Instant::now();
        let result = policy
            .run(|attempt| async move {
                if attempt == 3 { Tick::Done(attempt) } else { Tick::Continue }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(3));
        assert_eq!(started.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_secs(1), 5);
        let result: Option<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Tick::Continue }
            })
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_aborts() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 5);
        let err = policy
            .run(|_| async { Tick::<()>::Abort(WardenError::ProcessVanished("svc".into())) })
            .await
            .unwrap_err();
        assert!(err.is_start_failure());
    }
}
