use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use super::limiter::RateLimiter;

#[derive(Debug)]
struct DomainTable {
    limit: u32,
    limiters: HashMap<String, Arc<RateLimiter>>,
}

/// The global limiter plus one lazily created limiter per host.
///
/// A registry is meant to live for the whole process and be shared by every
/// batch, so the windows it tracks survive configuration changes between
/// batches. Use [`RateLimits::reconfigure`] to apply new rates.
#[derive(Debug)]
pub struct RateLimits {
    global: RateLimiter,
    domains: Mutex<DomainTable>,
}

impl RateLimits {
    pub fn new(global_limit: u32, domain_limit: u32) -> Self {
        Self {
            global: RateLimiter::new(global_limit),
            domains: Mutex::new(DomainTable {
                limit: domain_limit,
                limiters: HashMap::new(),
            }),
        }
    }

    fn domains(&self) -> MutexGuard<'_, DomainTable> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn global(&self) -> &RateLimiter {
        &self.global
    }

    /// Returns the limiter for `host`, creating it on first use.
    ///
    /// Hosts are compared case-insensitively and without any `:port` suffix.
    pub fn domain(&self, host: &str) -> Arc<RateLimiter> {
        let key = domain_key(host);
        let mut table = self.domains();
        let limit = table.limit;
        Arc::clone(
            table
                .limiters
                .entry(key)
                .or_insert_with(|| Arc::new(RateLimiter::new(limit))),
        )
    }

    /// Waits for a global permit, then for a permit for `host`.
    pub async fn acquire(&self, host: &str) {
        self.global.acquire().await;
        self.domain(host).acquire().await;
    }

    /// Applies new rates to the global limiter and every known host.
    ///
    /// Hosts whose window has closed and whose limiter is not in use are
    /// forgotten; they get a new limiter on their next request.
    pub fn reconfigure(&self, global_limit: u32, domain_limit: u32) {
        self.global.set_limit(global_limit);
        let now = Instant::now();
        let mut table = self.domains();
        table.limit = domain_limit;
        table
            .limiters
            .retain(|_, limiter| Arc::strong_count(limiter) > 1 || !limiter.is_idle(now));
        for limiter in table.limiters.values() {
            limiter.set_limit(domain_limit);
        }
    }

    pub fn tracked_domains(&self) -> usize {
        self.domains().limiters.len()
    }
}

fn domain_key(host: &str) -> String {
    let host = host.trim();
    let host = if host.starts_with('[') {
        // bracketed IPv6 literal, optionally followed by a port
        host.split_once(']')
            .map_or(host, |(addr, _)| addr.trim_start_matches('['))
    } else if host.matches(':').count() == 1 {
        host.split_once(':').map_or(host, |(name, _)| name)
    } else {
        host
    };
    host.to_ascii_lowercase()
}
