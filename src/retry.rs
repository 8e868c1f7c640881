//! Per-node retry policy: bounded exponential backoff with jitter, clamped
//! to the step's remaining deadline.
//!
//! Grounded in the teacher's `runtimes::runtime_config` pattern of a small,
//! cloneable configuration struct with a fluent builder; the backoff formula
//! itself has no teacher counterpart (the teacher does not retry node
//! execution), so it is modeled directly from the data model's
//! `RetryPolicy` fields.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::node::NodeError;

/// Predicate deciding whether a given error is retryable. Defaults to
/// retrying every `NodeError` except validation failures, which are treated
/// as permanent by convention.
pub type RetryOn = Arc<dyn Fn(&NodeError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub jitter: f64,
    pub max_elapsed_time: Option<Duration>,
    pub retry_on: RetryOn,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_interval", &self.initial_interval)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_interval", &self.max_interval)
            .field("jitter", &self.jitter)
            .field("max_elapsed_time", &self.max_elapsed_time)
            .finish_non_exhaustive()
    }
}

fn default_retry_on(error: &NodeError) -> bool {
    !matches!(error, NodeError::ValidationFailed(_))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(10),
            jitter: 0.1,
            max_elapsed_time: None,
            retry_on: Arc::new(default_retry_on),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_max_elapsed_time(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed_time = Some(max_elapsed);
        self
    }

    #[must_use]
    pub fn with_retry_on(mut self, predicate: RetryOn) -> Self {
        self.retry_on = predicate;
        self
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &NodeError) -> bool {
        attempt < self.max_attempts && (self.retry_on)(error)
    }

    /// Computes the delay before `attempt` (1-indexed), clamped to
    /// `step_deadline` if one is given. `attempt` is the attempt number that
    /// just failed; the returned delay precedes the next one.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32, step_deadline: Option<Duration>) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_interval.mul_f64(exp).min(self.max_interval);

        let jittered = if self.jitter > 0.0 {
            let mut rng = rand::rng();
            let factor = 1.0 + rng.random_range(-self.jitter..=self.jitter);
            base.mul_f64(factor.max(0.0))
        } else {
            base
        };

        match step_deadline {
            Some(deadline) => jittered.min(deadline),
            None => jittered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_respects_max() {
        let policy = RetryPolicy::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_backoff_factor(2.0)
            .with_max_interval(Duration::from_millis(300))
            .with_jitter(0.0);

        assert_eq!(policy.backoff_for(1, None), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2, None), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3, None), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(4, None), Duration::from_millis(300));
    }

    #[test]
    fn backoff_is_clamped_to_step_deadline() {
        let policy = RetryPolicy::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_jitter(0.0);
        let delay = policy.backoff_for(1, Some(Duration::from_millis(50)));
        assert_eq!(delay, Duration::from_millis(50));
    }

    #[test]
    fn should_retry_respects_max_attempts_and_predicate() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        let transient = NodeError::Provider {
            provider: "test",
            message: "timeout".into(),
        };
        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(2, &transient));

        let permanent = NodeError::ValidationFailed("bad input".into());
        assert!(!policy.should_retry(1, &permanent));
    }
}
