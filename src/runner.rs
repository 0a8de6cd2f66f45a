use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trust_dns_resolver::TokioAsyncResolver;

use crate::config::RunConfig;
use crate::dispatch::{Batch, Dispatcher};
use crate::error::Result;
use crate::http_probe::prelude::*;
use crate::rate_limit::RateLimits;

/// Owns what outlives a single batch: the DNS resolver and the rate limiter
/// registry.
///
/// Create one per process. Every batch gets a fresh [`Checker`] built from
/// its own [`RunConfig`], while the limiters keep counting across batches.
#[derive(Clone)]
pub struct Runner {
    resolver: TokioAsyncResolver,
    limits: Arc<RateLimits>,
}

impl Runner {
    pub fn new(resolver: TokioAsyncResolver, limits: Arc<RateLimits>) -> Self {
        Self { resolver, limits }
    }

    /// Runner whose limiters start out with the rates of `config`.
    pub fn from_config(config: &RunConfig, resolver: TokioAsyncResolver) -> Self {
        Self::new(
            resolver,
            Arc::new(RateLimits::new(config.global_rate, config.domain_rate)),
        )
    }

    pub fn limits(&self) -> &Arc<RateLimits> {
        &self.limits
    }

    /// Starts a batch over `urls` with a snapshot of `config`.
    pub fn run_batch(
        &self,
        urls: Vec<String>,
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<Batch> {
        config.validate()?;
        self.limits.reconfigure(config.global_rate, config.domain_rate);

        let checker = Checker::new(config, self.resolver.clone(), Arc::clone(&self.limits))?;
        let policy = RetryPolicy::new(checker, config.retries).with_backoff(config.retry_backoff);
        let dispatcher = Dispatcher::new(policy, config.concurrency);

        Ok(dispatcher.run_batch(urls, cancel))
    }
}
