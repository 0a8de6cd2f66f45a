use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode, redirect};
use tokio_util::sync::CancellationToken;
use trust_dns_resolver::TokioAsyncResolver;
use url::{Host, Url};

use super::prelude::*;
use super::report;
use crate::config::RunConfig;
use crate::error::Result;
use crate::rate_limit::RateLimits;

const USER_AGENT: &str = concat!("healthcheck/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Performs single attempts against URLs: rate limiting, DNS timing, the GET
/// request and classification of what came back.
#[derive(Clone)]
pub struct Checker {
    client: Client,
    resolver: TokioAsyncResolver,
    limits: Arc<RateLimits>,
    max_latency: Duration,
}

/// Builds the HTTP client used for every attempt of a batch.
pub fn build_client(config: &RunConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(config.insecure)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

impl Checker {
    pub fn new(
        config: &RunConfig,
        resolver: TokioAsyncResolver,
        limits: Arc<RateLimits>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            resolver,
            limits,
            max_latency: config.max_latency,
        })
    }

    /// Checks `url` once.
    pub async fn check(&self, url: &str, cancel: &CancellationToken) -> CheckResult {
        let result = CheckResult::new(url);

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return result.fail(ErrorKind::InvalidUrl, format!("URL parse error: {e}"));
            }
        };
        let Some(host) = host_name(&parsed) else {
            return result.fail(ErrorKind::InvalidUrl, format!("URL has no host: {url}"));
        };

        self.limits.acquire(&host).await;

        let dns_time = measure_dns_time(&host, &self.resolver).await;

        let request = match self.client.get(parsed).timeout(self.max_latency).build() {
            Ok(request) => request,
            Err(e) => {
                return result.with_latency(dns_time).fail(
                    ErrorKind::RequestError,
                    format!("Request creation error: {}", report(&e)),
                );
            }
        };

        if cancel.is_cancelled() {
            return result
                .with_latency(dns_time)
                .fail(ErrorKind::RequestFailed, "request cancelled before it was sent");
        }

        let start = Instant::now();
        let response = tokio::select! {
            response = self.client.execute(request) => Some(response),
            () = cancel.cancelled() => None,
        };
        let response_time = start.elapsed();
        let result = result.with_latency(dns_time + response_time);

        match response {
            None => result.fail(ErrorKind::RequestFailed, "request cancelled"),
            Some(Err(e)) if response_time >= self.max_latency => result.fail(
                ErrorKind::Timeout,
                format!(
                    "Response time exceeded {:?}: {}",
                    self.max_latency,
                    report(&e)
                ),
            ),
            Some(Err(e)) => result.fail(ErrorKind::RequestFailed, report(&e)),
            Some(Ok(response)) => {
                classify_reply(result, response.status(), response_time, self.max_latency)
            }
        }
    }
}

impl Probe for Checker {
    async fn check(&self, url: &str, cancel: &CancellationToken) -> CheckResult {
        Checker::check(self, url, cancel).await
    }
}

/// Classifies a reply that arrived after `response_time`. A reply slower
/// than `max_latency` is a timeout that keeps its status and response time.
fn classify_reply(
    result: CheckResult,
    status: StatusCode,
    response_time: Duration,
    max_latency: Duration,
) -> CheckResult {
    if response_time <= max_latency {
        return result.reply(status, response_time);
    }

    let mut result = result.fail(
        ErrorKind::Timeout,
        format!("Response time {response_time:?} exceeded maximum {max_latency:?}"),
    );
    result.status_code = Some(status.as_u16());
    result.response_time = response_time;
    result
}

/// Host part of the URL in the form the resolver expects, without port or
/// IPv6 brackets.
fn host_name(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) if !domain.is_empty() => Some(domain.to_ascii_lowercase()),
        Host::Domain(_) => None,
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

/// Time spent resolving `host`. A failed lookup still counts towards latency.
async fn measure_dns_time(host: &str, resolver: &TokioAsyncResolver) -> Duration {
    let start = Instant::now();
    let lookup = resolver.lookup_ip(host).await;
    let duration = start.elapsed();
    if let Err(e) = lookup {
        log::debug!("DNS lookup for {host} failed after {duration:?}: {e}");
    }
    duration
}
