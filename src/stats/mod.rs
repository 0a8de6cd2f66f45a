use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_probe::result::CheckResult;

/// Aggregate figures for one finished batch.
///
/// Timing fields only consider successful checks and stay zero when there
/// were none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_requests: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Percentage of successful checks, 0 for an empty batch.
    pub success_rate: f64,
    #[serde(rename = "avg_response_time_ms", with = "crate::serde_ms")]
    pub avg_response_time: Duration,
    #[serde(rename = "min_response_time_ms", with = "crate::serde_ms")]
    pub min_response_time: Duration,
    #[serde(rename = "max_response_time_ms", with = "crate::serde_ms")]
    pub max_response_time: Duration,
    #[serde(rename = "avg_latency_ms", with = "crate::serde_ms")]
    pub avg_latency: Duration,
    #[serde(rename = "min_latency_ms", with = "crate::serde_ms")]
    pub min_latency: Duration,
    #[serde(rename = "max_latency_ms", with = "crate::serde_ms")]
    pub max_latency: Duration,
    #[serde(rename = "total_duration_ms", with = "crate::serde_ms")]
    pub total_duration: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Spread {
    avg: Duration,
    min: Duration,
    max: Duration,
}

impl Spread {
    fn of(samples: impl Iterator<Item = Duration>) -> Self {
        let mut count: u128 = 0;
        let mut sum: u128 = 0;
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;

        for sample in samples {
            count += 1;
            sum += sample.as_nanos();
            min = min.min(sample);
            max = max.max(sample);
        }

        if count == 0 {
            return Self::default();
        }

        let avg = u64::try_from(sum / count).unwrap_or(u64::MAX);
        Self {
            avg: Duration::from_nanos(avg),
            min,
            max,
        }
    }
}

/// Reduces the results of a batch into [`Statistics`].
pub fn summarize(results: &[CheckResult], total_duration: Duration) -> Statistics {
    let total_requests = results.len();
    let success_count = results.iter().filter(|r| r.success).count();
    let failure_count = total_requests - success_count;

    let success_rate = if total_requests == 0 {
        0.0
    } else {
        100.0 * success_count as f64 / total_requests as f64
    };

    let successes = || results.iter().filter(|r| r.success);
    let response = Spread::of(successes().map(|r| r.response_time));
    let latency = Spread::of(successes().map(|r| r.latency));

    Statistics {
        total_requests,
        success_count,
        failure_count,
        success_rate,
        avg_response_time: response.avg,
        min_response_time: response.min,
        max_response_time: response.max,
        avg_latency: latency.avg,
        min_latency: latency.min,
        max_latency: latency.max,
        total_duration,
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total:          {}", self.total_requests)?;
        writeln!(f, "Successful:     {}", self.success_count)?;
        writeln!(f, "Failed:         {}", self.failure_count)?;
        writeln!(f, "Success rate:   {:.2}%", self.success_rate)?;
        writeln!(
            f,
            "Response time:  avg {:.2}ms, min {:.2}ms, max {:.2}ms",
            ms(self.avg_response_time),
            ms(self.min_response_time),
            ms(self.max_response_time)
        )?;
        writeln!(
            f,
            "Latency:        avg {:.2}ms, min {:.2}ms, max {:.2}ms",
            ms(self.avg_latency),
            ms(self.min_latency),
            ms(self.max_latency)
        )?;
        write!(f, "Total duration: {:.2}s", self.total_duration.as_secs_f64())
    }
}
