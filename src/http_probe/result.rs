use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a check did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The target could not be parsed as an absolute URL with a host.
    InvalidUrl,
    /// The request could not be built.
    RequestError,
    /// The request failed on the way: connection, TLS, redirects, cancellation.
    RequestFailed,
    /// No reply within the latency bound, or a reply that arrived too late.
    Timeout,
    /// A reply arrived in time with a status outside 2xx.
    HttpError,
}

impl ErrorKind {
    /// Only transport failures and timeouts are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RequestFailed | Self::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::RequestError => "request_error",
            Self::RequestFailed => "request_failed",
            Self::Timeout => "timeout",
            Self::HttpError => "http_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one URL.
///
/// `success` is only ever set together with a 2xx status and no error kind.
/// A 2xx reply that took longer than the latency bound is still a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub status_code: Option<u16>,
    /// Duration of the HTTP round trip, set only when a reply arrived.
    #[serde(rename = "response_time_ms", with = "crate::serde_ms")]
    pub response_time: Duration,
    /// DNS resolution time plus HTTP round trip.
    #[serde(rename = "latency_ms", with = "crate::serde_ms")]
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Number of attempts spent on this URL; only the last one is reported.
    pub attempts: u32,
}

impl CheckResult {
    /// An attempt that has not produced an outcome yet.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            response_time: Duration::ZERO,
            latency: Duration::ZERO,
            error: None,
            error_message: None,
            timestamp: Utc::now(),
            success: false,
            attempts: 1,
        }
    }

    /// Marks the result as failed with the given kind and detail.
    pub fn fail(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(kind);
        self.error_message = Some(message.into());
        self
    }

    /// Records a reply that arrived within the latency bound and classifies
    /// it by status code.
    pub fn reply(mut self, status: reqwest::StatusCode, response_time: Duration) -> Self {
        self.status_code = Some(status.as_u16());
        self.response_time = response_time;
        if status.is_success() {
            self.success = true;
            self.error = None;
            self.error_message = None;
            self
        } else {
            let reason = status.canonical_reason().unwrap_or("Unknown Status");
            self.fail(
                ErrorKind::HttpError,
                format!("HTTP {}: {}", status.as_u16(), reason),
            )
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.error.is_some_and(ErrorKind::is_retryable)
    }

    pub fn response_time_ms(&self) -> f64 {
        self.response_time.as_secs_f64() * 1000.0
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}
