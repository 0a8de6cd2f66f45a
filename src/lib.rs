//! Concurrent HTTP(S) health checking.
//!
//! A [`Runner`] checks a list of URLs in parallel under a global and a
//! per-host rate limit, retries transient failures with exponential backoff
//! and reduces the outcome into [`Statistics`].
//!
//! ```ignore
//! use healthcheck::{Runner, RunConfig, config::setup_resolver};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RunConfig::default();
//! let runner = Runner::from_config(&config, setup_resolver(&["1.1.1.1".into()])?);
//! let batch = runner.run_batch(urls, &config, CancellationToken::new())?;
//! let (results, statistics) = batch.collect().await;
//! println!("{statistics}");
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http_probe;
pub mod rate_limit;
pub mod runner;
mod serde_ms;
pub mod stats;
pub mod storage;

pub use config::RunConfig;
pub use dispatch::{Batch, BatchHandle, Dispatcher};
pub use error::{Error, Result};
pub use http_probe::prelude::*;
pub use rate_limit::{RateLimiter, RateLimits};
pub use runner::Runner;
pub use stats::{Statistics, summarize};
pub use storage::{History, RunRecord, save_csv, save_json};
