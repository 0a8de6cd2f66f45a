//! Request rate limiting shared by all checks.
//!
//! Every outbound request first takes a permit from the global limiter and
//! then one from the limiter of its target host.

pub mod limiter;
pub mod registry;

pub use limiter::{RateLimiter, WINDOW};
pub use registry::RateLimits;
