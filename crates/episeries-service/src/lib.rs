//! HTTP REST API for gap-filled epidemiological indicator series.
//!
//! This crate provides a service that:
//! - Opens the local indicator database
//! - Exposes the series engine over a REST API
//! - Bounds every query by a configurable timeout
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/indicators` - List indicator definitions
//! - `GET /api/indicators/:name` - One indicator definition
//! - `GET /api/indicators/:name/series` - Gap-filled series
//! - `GET /api/indicators/:name/locations` - Gap-filled series per location
//! - `GET /api/indicators/:name/interval` - First and last stored dates
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/episeries/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/episeries/data.db"
//!
//! [query]
//! timeout_secs = 30
//! max_range_days = 3660
//! ```

pub mod api;
pub mod config;
pub mod state;

pub use config::{Config, ConfigError, QueryConfig, ServerConfig, StorageConfig};
pub use state::AppState;
