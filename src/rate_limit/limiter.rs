use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Length of one accounting window.
pub const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WindowState {
    limit: u32,
    started: Option<Instant>,
    granted: u32,
}

/// Fixed-window permit counter.
///
/// At most `limit` permits are granted per window. A window opens with the
/// first permit granted after the previous one expired and lasts [`WINDOW`];
/// permits left unused when it closes are not carried over.
///
/// Callers that find the window exhausted sleep until it closes instead of
/// polling, so a waiter wakes exactly when a new permit can exist.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    state: Mutex<WindowState>,
}

enum Denied {
    /// The current window is exhausted; try again at this instant.
    Until(Instant),
    /// A limit of zero never grants anything.
    Never,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(WindowState {
                limit,
                started: None,
                granted: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_grant(&self, now: Instant) -> Result<(), Denied> {
        let mut state = self.state();
        if state.limit == 0 {
            return Err(Denied::Never);
        }

        match state.started {
            Some(started) if now.duration_since(started) < self.window => {
                if state.granted < state.limit {
                    state.granted += 1;
                    Ok(())
                } else {
                    Err(Denied::Until(started + self.window))
                }
            }
            _ => {
                state.started = Some(now);
                state.granted = 1;
                Ok(())
            }
        }
    }

    /// Grants a permit if the current window still has one left.
    pub fn allow(&self) -> bool {
        self.try_grant(Instant::now()).is_ok()
    }

    /// Waits until a permit is granted.
    ///
    /// With a limit of zero this never completes.
    pub async fn acquire(&self) {
        loop {
            match self.try_grant(Instant::now()) {
                Ok(()) => return,
                Err(Denied::Until(reset_at)) => sleep_until(reset_at).await,
                Err(Denied::Never) => std::future::pending::<()>().await,
            }
        }
    }

    pub fn limit(&self) -> u32 {
        self.state().limit
    }

    /// Whether no window is open at `now`. An idle limiter behaves exactly
    /// like a freshly created one.
    pub(crate) fn is_idle(&self, now: Instant) -> bool {
        self.state()
            .started
            .is_none_or(|started| now.duration_since(started) >= self.window)
    }

    /// Changes the per-window limit without resetting the current window.
    pub fn set_limit(&self, limit: u32) {
        self.state().limit = limit;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allow_exhausts_window() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(WINDOW).await;
        assert!(limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_permits_do_not_carry_over() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.allow());

        tokio::time::advance(WINDOW * 2).await;
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_never_grants() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.allow());

        let waited = tokio::time::timeout(Duration::from_secs(10), limiter.acquire()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_limit() {
        let limit = 3;
        let limiter = Arc::new(RateLimiter::new(limit));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut granted_at = Vec::new();
        for handle in handles {
            granted_at.push(handle.await.unwrap());
        }
        granted_at.sort();

        for (i, at) in granted_at.iter().enumerate() {
            let in_window = granted_at[i..]
                .iter()
                .take_while(|later| later.duration_since(*at) < WINDOW)
                .count();
            assert!(in_window <= limit as usize, "{in_window} permits within one window");
        }

        // 10 permits at 3 per window need four windows
        assert!(granted_at[9].duration_since(start) >= WINDOW * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_permit_waits_a_full_window() {
        let limiter = Arc::new(RateLimiter::new(1));

        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        };
        let second = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        };

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
        assert!(later.duration_since(earlier) >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_limit_keeps_current_window() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.allow());
        assert!(!limiter.allow());

        limiter.set_limit(2);
        assert_eq!(limiter.limit(), 2);
        // the window that already granted one permit now has room for one more
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }
}
