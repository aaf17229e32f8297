//! Cancellation and timeout guard for storage calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounds every storage call of one request by the caller's cancellation
/// token and the configured query timeout.
#[derive(Debug, Clone)]
pub struct CallGuard {
    cancel: CancellationToken,
    timeout: Duration,
}

impl CallGuard {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// The request's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a storage call. The call is dropped when the token is cancelled
    /// or the timeout elapses.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = episeries_store::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = timeout(self.timeout, call) => match res {
                Ok(rows) => rows.map_err(Error::from),
                Err(_) => Err(Error::timeout(operation, self.timeout)),
            },
        }
    }
}
