//! Fixed-delay retry policy
//!
//! Provider control planes occasionally reject an operation with a
//! condition that clears on its own (a freshly provisioned account still
//! "finalizing", for example). This policy retries exactly those errors and
//! propagates everything else untouched.

use std::future::Future;
use std::time::Duration;

/// Retry an operation a bounded number of times with a fixed delay
///
/// `max_retries` counts retries after the first attempt, so an operation
/// runs at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Run `op`, retrying while `is_transient` accepts the error and the
    /// retry budget lasts
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    attempt += 1;
                    tracing::debug!(
                        "transient failure (attempt {}/{}): {}, retrying in {:?}",
                        attempt,
                        self.max_retries,
                        err,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
