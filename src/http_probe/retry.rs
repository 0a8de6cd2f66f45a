use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::prelude::*;

/// Delay before the first retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Repeats retryable failures with exponential backoff.
///
/// At most `retries + 1` attempts are made. Only timeouts and transport
/// failures are retried; the result of the last attempt is returned.
#[derive(Debug, Clone)]
pub struct RetryPolicy<P> {
    probe: P,
    retries: u32,
    base_backoff: Duration,
}

impl<P: Probe> RetryPolicy<P> {
    pub fn new(probe: P, retries: u32) -> Self {
        Self {
            probe,
            retries,
            base_backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Delay slept before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }

    /// The backoff sleep is not interrupted by `cancel`; cancellation is
    /// noticed when the next attempt tries to send its request.
    pub async fn check_with_retry(&self, url: &str, cancel: &CancellationToken) -> CheckResult {
        let mut attempt = 1;
        loop {
            let mut result = self.probe.check(url, cancel).await;
            result.attempts = attempt;

            if result.success || !result.is_retryable() || attempt > self.retries {
                return result;
            }

            let delay = self.backoff(attempt);
            log::debug!(
                "Attempt {attempt} for {url} failed with {}, retrying in {delay:?}",
                result.error.map_or("unknown", ErrorKind::as_str)
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl<P: Probe> Probe for RetryPolicy<P> {
    async fn check(&self, url: &str, cancel: &CancellationToken) -> CheckResult {
        self.check_with_retry(url, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use reqwest::StatusCode;
    use tokio::time::Instant;

    use super::*;

    /// Answers each attempt from a script and records when it was made.
    struct ScriptedProbe {
        script: Vec<ErrorKind>,
        ok_after_script: bool,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProbe {
        fn failing(kind: ErrorKind) -> Self {
            Self {
                script: vec![kind; 64],
                ok_after_script: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_then_ok(script: Vec<ErrorKind>) -> Self {
            Self {
                script,
                ok_after_script: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Probe for ScriptedProbe {
        async fn check(&self, url: &str, _cancel: &CancellationToken) -> CheckResult {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() - 1
            };
            let result = CheckResult::new(url);
            match self.script.get(attempt) {
                Some(kind) => result.fail(*kind, format!("attempt {attempt}")),
                None if self.ok_after_script => {
                    result.reply(StatusCode::OK, Duration::from_millis(1))
                }
                None => result.fail(ErrorKind::Timeout, "script exhausted"),
            }
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(ScriptedProbe::failing(ErrorKind::Timeout), 5);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        // no overflow for absurd retry counts
        assert_eq!(policy.backoff(200), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_retry_with_exponential_backoff() {
        let retries = 3;
        let policy = RetryPolicy::new(ScriptedProbe::failing(ErrorKind::Timeout), retries);

        let result = policy
            .check_with_retry("https://example.com", &CancellationToken::new())
            .await;

        assert_eq!(result.error, Some(ErrorKind::Timeout));
        assert_eq!(result.attempts, retries + 1);

        let calls = policy.probe().calls();
        assert_eq!(calls.len(), retries as usize + 1);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_failures_are_retried() {
        let policy = RetryPolicy::new(ScriptedProbe::failing(ErrorKind::RequestFailed), 2)
            .with_backoff(Duration::from_millis(10));

        let result = policy
            .check_with_retry("https://example.com", &CancellationToken::new())
            .await;

        assert_eq!(result.error, Some(ErrorKind::RequestFailed));
        assert_eq!(policy.probe().calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_errors_stop_immediately() {
        for kind in [
            ErrorKind::HttpError,
            ErrorKind::InvalidUrl,
            ErrorKind::RequestError,
        ] {
            let policy = RetryPolicy::new(ScriptedProbe::failing(kind), 3);
            let result = policy
                .check_with_retry("https://example.com", &CancellationToken::new())
                .await;

            assert_eq!(result.error, Some(kind));
            assert_eq!(result.attempts, 1);
            assert_eq!(policy.probe().calls().len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_success() {
        let probe = ScriptedProbe::failing_then_ok(vec![ErrorKind::Timeout]);
        let policy = RetryPolicy::new(probe, 3);

        let result = policy
            .check_with_retry("https://example.com", &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(policy.probe().calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_attempt() {
        let policy = RetryPolicy::new(ScriptedProbe::failing(ErrorKind::Timeout), 0);
        let result = policy
            .check_with_retry("https://example.com", &CancellationToken::new())
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(policy.probe().calls().len(), 1);
    }
}
