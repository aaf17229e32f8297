//! REST API endpoints for the episeries-service.
//!
//! Series endpoints accept the indicator's filter parameters as query
//! string pairs. Filter values containing commas (or repeated keys) are
//! treated as lists:
//!
//! ```text
//! GET /api/indicators/cases/series?location=DE-BY,DE-BE&split=age_group&start_date=2024-01-01
//! ```
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Invalid
//! parameters return 400, unknown indicators 404, and a query that exceeds
//! its timeout 504. Storage and reconstruction failures return 500.
//!
//! Each request runs under its own cancellation token. Dropping the
//! connection or shutting the server down stops in-flight storage calls.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, warn};

use episeries_core::{
    FilterParams, FilterValue, INDICATORS, Indicator, QuerySpec, SeriesResponse,
};
use episeries_types::{DailyEntry, DateInterval, LocationDay};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/indicators", get(list_indicators))
        .route("/api/indicators/{name}", get(get_indicator))
        .route("/api/indicators/{name}/series", get(get_series))
        .route("/api/indicators/{name}/locations", get(get_location_series))
        .route("/api/indicators/{name}/interval", get(get_interval))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

async fn list_indicators() -> Json<&'static [Indicator]> {
    Json(INDICATORS)
}

async fn get_indicator(Path(name): Path<String>) -> Result<Json<&'static Indicator>, AppError> {
    Ok(Json(lookup(&name)?))
}

/// Gap-filled series for an indicator.
async fn get_series(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<SeriesResponse<DailyEntry>>, AppError> {
    let spec = build_spec(&name, pairs)?;
    let (cancel, _guard) = state.request_token();
    let series = state.engine.get_series(&spec, &cancel).await?;
    Ok(Json(series))
}

/// Gap-filled series with one entry per requested location.
///
/// Requires at least one `location`.
async fn get_location_series(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<SeriesResponse<LocationDay>>, AppError> {
    let spec = build_spec(&name, pairs)?;
    let (cancel, _guard) = state.request_token();
    let series = state
        .engine
        .get_location_series(&spec, &spec.locations(), &cancel)
        .await?;
    Ok(Json(series))
}

/// First and last stored dates for an indicator query.
async fn get_interval(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<DateInterval>, AppError> {
    let spec = build_spec(&name, pairs)?;
    let (cancel, _guard) = state.request_token();
    let interval = state.engine.get_date_interval(&spec, &cancel).await?;
    Ok(Json(interval))
}

fn lookup(name: &str) -> Result<&'static Indicator, AppError> {
    Indicator::by_name(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown indicator: {name}")))
}

fn build_spec(name: &str, pairs: Vec<(String, String)>) -> Result<QuerySpec, AppError> {
    let indicator = lookup(name)?;
    let params = filter_params(pairs);
    Ok(QuerySpec::build(indicator, &params)?)
}

/// Collect query string pairs into filter parameters.
///
/// Comma-separated or repeated values become lists. Keys that are not
/// common parameters are passed through as indicator filters and
/// validated when the query is built.
pub fn filter_params(pairs: Vec<(String, String)>) -> FilterParams {
    let mut params = FilterParams::new();

    for (key, value) in pairs {
        match key.as_str() {
            "split" => params.split = Some(value),
            "start_date" => params.start_date = Some(value),
            "end_date" => params.end_date = Some(value),
            "period_type" => params.period_type = Some(value),
            "empty_fields" => params.empty_fields.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            ),
            "subcategory" => merge(&mut params.subcategory, &value),
            "location" => merge(&mut params.location, &value),
            "total_type" => merge(&mut params.total_type, &value),
            _ => {
                let mut slot = params.extra.remove(&key);
                merge(&mut slot, &value);
                if let Some(filter) = slot {
                    params.extra.insert(key, filter);
                }
            }
        }
    }

    params
}

fn merge(slot: &mut Option<FilterValue>, raw: &str) {
    let incoming: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    let merged = match (slot.take(), raw.contains(',')) {
        (None, false) => FilterValue::One(raw.trim().to_string()),
        (None, true) => FilterValue::Many(incoming),
        (Some(FilterValue::One(first)), _) => {
            let mut values = vec![first];
            values.extend(incoming);
            FilterValue::Many(values)
        }
        (Some(FilterValue::Many(mut values)), _) => {
            values.extend(incoming);
            FilterValue::Many(values)
        }
    };
    *slot = Some(merged);
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Engine(episeries_core::Error),
}

impl From<episeries_core::Error> for AppError {
    fn from(e: episeries_core::Error) -> Self {
        if e.is_validation() {
            AppError::BadRequest(e.to_string())
        } else {
            AppError::Engine(e)
        }
    }
}

impl From<episeries_core::ValidationError> for AppError {
    fn from(e: episeries_core::ValidationError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use episeries_core::Error;

        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Engine(e @ Error::Timeout { .. }) => {
                warn!("{}", e);
                (StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
            AppError::Engine(e @ Error::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            AppError::Engine(e) => {
                error!("Series query failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
