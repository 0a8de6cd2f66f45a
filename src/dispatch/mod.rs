//! Fans a list of URLs out over a bounded pool of tasks.
//!
//! Each URL becomes its own tokio task. A semaphore sized to the configured
//! concurrency decides how many of them may be checking at once. Results are
//! streamed in completion order and a second stream reports how many URLs
//! have finished so far.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::http_probe::prelude::*;
use crate::stats::{Statistics, summarize};

/// Check results in the order the checks finished.
pub type ResultStream = UnboundedReceiverStream<CheckResult>;

/// Number of finished checks, strictly increasing, ending at the batch size.
pub type ProgressStream = UnboundedReceiverStream<usize>;

pub struct Dispatcher<P> {
    policy: Arc<RetryPolicy<P>>,
    concurrency: usize,
}

impl<P: Probe + 'static> Dispatcher<P> {
    pub fn new(policy: RetryPolicy<P>, concurrency: usize) -> Self {
        Self {
            policy: Arc::new(policy),
            concurrency: concurrency.max(1),
        }
    }

    /// Starts checking `urls` and returns immediately.
    ///
    /// Must be called from within a tokio runtime. Both streams end once
    /// every URL has been checked; neither has to be consumed for the batch
    /// to make progress.
    pub fn run_batch(&self, urls: Vec<String>, cancel: CancellationToken) -> Batch {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let total = urls.len();
        let started = Instant::now();

        log::info!(
            "Checking {total} URLs with concurrency {}",
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(Mutex::new(0usize));
        let policy = Arc::clone(&self.policy);

        let driver = tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            for url in urls {
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let policy = Arc::clone(&policy);
                let result_tx = result_tx.clone();
                let progress_tx = progress_tx.clone();
                let cancel = cancel.clone();

                tasks.spawn(async move {
                    let Ok(permit) = semaphore.acquire_owned().await else {
                        return;
                    };

                    let result = policy.check_with_retry(&url, &cancel).await;
                    let _ = result_tx.send(result);
                    drop(permit);

                    // the counter lock also orders the progress messages
                    let mut done = completed.lock().unwrap_or_else(PoisonError::into_inner);
                    *done += 1;
                    let _ = progress_tx.send(*done);
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    log::error!("Check task did not complete: {e}");
                }
            }

            let duration = started.elapsed();
            log::info!("Checked {total} URLs in {duration:?}");
            duration
        });

        Batch {
            results: UnboundedReceiverStream::new(result_rx),
            progress: UnboundedReceiverStream::new(progress_rx),
            handle: BatchHandle {
                total,
                started,
                driver,
            },
        }
    }
}

/// A batch in flight.
pub struct Batch {
    results: ResultStream,
    progress: ProgressStream,
    handle: BatchHandle,
}

impl Batch {
    pub fn total(&self) -> usize {
        self.handle.total
    }

    /// Separates the two streams from the handle that waits for completion.
    pub fn split(self) -> (ResultStream, ProgressStream, BatchHandle) {
        (self.results, self.progress, self.handle)
    }

    /// Waits for every result and summarises them.
    pub async fn collect(self) -> (Vec<CheckResult>, Statistics) {
        let (results, _progress, handle) = self.split();
        let results: Vec<CheckResult> = results.collect().await;
        let statistics = handle.finish(&results).await;
        (results, statistics)
    }
}

pub struct BatchHandle {
    total: usize,
    started: Instant,
    driver: JoinHandle<Duration>,
}

impl BatchHandle {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Waits for the batch to finish and summarises `results`.
    ///
    /// The total duration is the time from starting the batch until its last
    /// check finished, however late this is called.
    pub async fn finish(self, results: &[CheckResult]) -> Statistics {
        let duration = match self.driver.await {
            Ok(duration) => duration,
            Err(e) => {
                log::error!("Batch driver did not complete: {e}");
                self.started.elapsed()
            }
        };
        if results.len() != self.total {
            log::warn!(
                "Summarising {} results for a batch of {} URLs",
                results.len(),
                self.total
            );
        }
        summarize(results, duration)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::StatusCode;

    use super::*;

    /// Succeeds after a short delay while tracking how many checks overlap.
    #[derive(Default)]
    struct SlowProbe {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Probe for SlowProbe {
        async fn check(&self, url: &str, _cancel: &CancellationToken) -> CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = 10 + (url.len() % 7) as u64 * 5;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("missing") {
                CheckResult::new(url).reply(StatusCode::NOT_FOUND, Duration::from_millis(delay))
            } else {
                CheckResult::new(url).reply(StatusCode::OK, Duration::from_millis(delay))
            }
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://host{}.example.com/{}", i % 3, "x".repeat(i)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_one_result_per_url() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 0), 4);
        let input = urls(25);

        let (results, progress, handle) =
            dispatcher.run_batch(input.clone(), CancellationToken::new()).split();
        let progress: Vec<usize> = progress.collect().await;
        let results: Vec<CheckResult> = results.collect().await;
        let stats = handle.finish(&results).await;

        assert_eq!(results.len(), 25);
        assert_eq!(progress, (1..=25).collect::<Vec<_>>());
        assert_eq!(stats.total_requests, 25);

        let mut seen: Vec<String> = results.into_iter().map(|r| r.url).collect();
        let mut expected = input;
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 0), 3);

        let (results, stats) = dispatcher
            .run_batch(urls(20), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 20);
        assert_eq!(stats.success_count, 20);
        let probe = dispatcher.policy.probe();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 20);
        let max = probe.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "{max} checks ran at once");
        assert!(max >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_batch() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 2), 2);
        let input = vec![
            "https://example.com/missing".to_string(),
            "https://example.com/".to_string(),
            "https://example.org/missing".to_string(),
        ];

        let (results, stats) = dispatcher
            .run_batch(input, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 2);
        // http errors are not retried
        assert_eq!(dispatcher.policy.probe().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_closes_streams() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 0), 2);
        let batch = dispatcher.run_batch(Vec::new(), CancellationToken::new());
        assert_eq!(batch.total(), 0);

        let (results, progress, handle) = batch.split();
        assert_eq!(progress.collect::<Vec<_>>().await, Vec::<usize>::new());
        let results: Vec<CheckResult> = results.collect().await;
        let stats = handle.finish(&results).await;
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_duration_ends_with_last_check() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 0), 2);
        let (results, _progress, handle) = dispatcher
            .run_batch(vec!["https://example.com/".to_string()], CancellationToken::new())
            .split();

        let results: Vec<CheckResult> = results.collect().await;
        // time spent by the caller after the batch drained
        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = handle.finish(&results).await;

        assert_eq!(stats.total_requests, 1);
        assert!(stats.total_duration >= results[0].response_time);
        assert!(stats.total_duration < Duration::from_secs(1), "{:?}", stats.total_duration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_is_raised_to_one() {
        let dispatcher = Dispatcher::new(RetryPolicy::new(SlowProbe::default(), 0), 0);
        let (results, _) = dispatcher
            .run_batch(urls(3), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(dispatcher.policy.probe().max_in_flight.load(Ordering::SeqCst), 1);
    }
}
