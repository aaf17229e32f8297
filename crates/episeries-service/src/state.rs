//! Application state shared across handlers.

use std::sync::Arc;

use episeries_core::{SeriesService, Storage};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The series engine over the configured storage.
    pub engine: SeriesService<dyn Storage>,
    /// Configuration the server was started with.
    pub config: Config,
    /// Cancelled when the server shuts down; each request runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    ///
    /// Engine limits come from `config.query`.
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Arc<Self> {
        let engine = SeriesService::new(storage, config.query.engine_options());
        Arc::new(Self {
            engine,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token for a single request.
    ///
    /// Cancelled on server shutdown, or when the returned guard is dropped
    /// because the client went away.
    pub fn request_token(&self) -> (CancellationToken, tokio_util::sync::DropGuard) {
        let token = self.shutdown.child_token();
        let guard = token.clone().drop_guard();
        (token, guard)
    }
}
