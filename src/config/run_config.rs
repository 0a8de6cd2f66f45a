use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_LATENCY: Duration = Duration::from_secs(30);
const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_DOMAIN_RATE: u32 = 5;
const DEFAULT_GLOBAL_RATE: u32 = 50;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Settings for one batch of checks.
///
/// A batch takes its own copy of this value when it starts, so changing a
/// `RunConfig` afterwards never affects checks that are already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Overall timeout configured on the HTTP client.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Upper bound on the response time of a single request. Slower replies
    /// are recorded as timeouts even when the status code was fine.
    #[serde(with = "humantime_serde")]
    pub max_latency: Duration,

    /// Maximum number of URLs checked at the same time.
    pub concurrency: usize,

    /// Extra attempts after the first one for retryable failures.
    pub retries: u32,

    /// Requests per second allowed against a single host.
    pub domain_rate: u32,

    /// Requests per second allowed across all hosts.
    pub global_rate: u32,

    /// Skip TLS certificate verification.
    pub insecure: bool,

    /// Delay before the first retry. Each later retry waits twice as long as
    /// the one before it.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_latency: DEFAULT_MAX_LATENCY,
            concurrency: DEFAULT_CONCURRENCY,
            retries: DEFAULT_RETRIES,
            domain_rate: DEFAULT_DOMAIN_RATE,
            global_rate: DEFAULT_GLOBAL_RATE,
            insecure: false,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RunConfig {
    /// Rejects settings under which a batch could never finish.
    ///
    /// A rate of zero never grants a permit and a concurrency of zero never
    /// admits a task, so both would leave every check waiting forever.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.global_rate == 0 {
            return Err(Error::InvalidConfig(
                "global_rate must be at least 1 request per second".to_string(),
            ));
        }
        if self.domain_rate == 0 {
            return Err(Error::InvalidConfig(
                "domain_rate must be at least 1 request per second".to_string(),
            ));
        }
        if self.max_latency.is_zero() {
            return Err(Error::InvalidConfig(
                "max_latency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
