//! Retry with exponential backoff and jitter for model-server calls.

use rand::{thread_rng, Rng};
use std::thread::sleep;
use std::time::Duration;
use tracing::warn;

use super::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff.min(self.max_delay_ms))
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up. The last error is returned.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, LlmError>
where
    F: FnMut() -> Result<T, LlmError>,
{
    let mut attempt = 0u32;
    let mut rng = thread_rng();
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || attempt > policy.max_retries {
                    return Err(err);
                }
                let jitter = rng.gen_range(0..=policy.base_delay_ms);
                let delay = policy.delay_for_attempt(attempt) + Duration::from_millis(jitter);
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Model call failed, retrying"
                );
                sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, 0, 0)
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 350);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retries_transient_then_succeeds() {
        let calls = Cell::new(0);
        let result = with_retry(&instant(3), "test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(LlmError::Status { status: 503, body: String::new() })
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_non_retryable_fails_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&instant(3), "test", || {
            calls.set(calls.get() + 1);
            Err(LlmError::Status { status: 400, body: "bad request".into() })
        });
        assert!(matches!(result, Err(LlmError::Status { status: 400, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&instant(2), "test", || {
            calls.set(calls.get() + 1);
            Err(LlmError::Transport("refused".into()))
        });
        assert!(matches!(result, Err(LlmError::Transport(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_none_policy_single_attempt() {
        let calls = Cell::new(0);
        let _: Result<(), _> = with_retry(&RetryPolicy::none(), "test", || {
            calls.set(calls.get() + 1);
            Err(LlmError::Transport("refused".into()))
        });
        assert_eq!(calls.get(), 1);
    }
}
