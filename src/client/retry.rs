use super::ChainClientError;
use crate::constants::{REQUEST_RETRY_ATTEMPTS, REQUEST_RETRY_DELAY_SECS};
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};

/// Fixed attempt count with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: REQUEST_RETRY_ATTEMPTS,
            delay: Duration::from_secs(REQUEST_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Run `request` until it succeeds, fails terminally, or the attempts are used up
    pub async fn run<T, F, Fut>(&self, what: &str, mut request: F) -> Result<T, ChainClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainClientError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{what} succeeded after {attempt} attempt(s)");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("Retrying {what} (attempt {attempt}/{attempts}) due to: {e}");
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
