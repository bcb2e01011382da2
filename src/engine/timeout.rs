//! Deadlines for the two engine phases
//!
//! The request deadline bounds fetch + transform and turns an overrun into
//! `GatewayError::Timeout`. The save deadline bounds write-back, which runs
//! detached from the response, so its overrun is only reported to the caller
//! for logging.

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

use crate::constants::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SAVE_TIMEOUT_MS};
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutController {
    request: Duration,
    save: Duration,
}

impl Default for TimeoutController {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_SAVE_TIMEOUT_MS),
        )
    }
}

impl TimeoutController {
    pub fn new(request: Duration, save: Duration) -> Self {
        Self { request, save }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request
    }

    pub fn save_timeout(&self) -> Duration {
        self.save
    }

    /// Run the fetch + transform phase under the request deadline
    pub async fn run_request<F, T>(&self, work: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.request, work).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                after_ms: self.request.as_millis() as u64,
            }),
        }
    }

    /// Run the write-back phase under the save deadline
    pub async fn run_save<F, T>(&self, work: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.save, work).await
    }
}
