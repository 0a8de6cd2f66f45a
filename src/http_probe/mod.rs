pub mod probe;
pub mod result;
pub mod retry;

use std::fmt::Write;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use result::CheckResult;

pub mod prelude {
    pub use super::Probe;
    pub use super::probe::Checker;
    pub use super::result::{CheckResult, ErrorKind};
    pub use super::retry::RetryPolicy;
}

/// Something that can check a single URL.
///
/// A check never fails as a call; every problem is recorded on the returned
/// [`CheckResult`].
pub trait Probe: Send + Sync {
    fn check(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = CheckResult> + Send;
}

/// Formats an error together with its chain of sources.
pub(crate) fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}
