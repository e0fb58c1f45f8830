// HTTP request handlers
use crate::application::live_poller::{LivePoller, LiveUpdate};
use crate::application::pipeline::SeriesRequest;
use crate::domain::error::PipelineError;
use crate::domain::operator::{Operator, REGISTRY};
use crate::domain::time_range::TimeRange;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

const DEFAULT_RANGE: &str = "1h";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeriesParams {
    /// Comma-separated PV names.
    pub pvs: String,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Relative trailing window such as `15m`, `6h` or `7d`.
    pub range: Option<String>,
    pub width: Option<u32>,
    pub resolution: Option<String>,
    pub operator: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CurrentParams {
    pub pvs: String,
    /// RFC 3339 instant; defaults to now.
    pub at: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// A handler failure rendered as `{"error": ...}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::Lookup(_) => StatusCode::BAD_GATEWAY,
            PipelineError::InvalidRange(_) | PipelineError::NoPvs => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

async fn respond<T: Serialize>(status: StatusCode, data: &T, compress: bool) -> Response {
    match json_response(status, data, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn respond_error(err: ApiError, compress: bool) -> Response {
    tracing::warn!(status = err.status.as_u16(), "Request rejected: {}", err.message);
    respond(err.status, &ErrorBody { error: err.message }, compress).await
}

fn split_pvs(pvs: &str) -> Vec<String> {
    pvs.split(',')
        .map(str::trim)
        .filter(|pv| !pv.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_operator(operator: Option<&str>) -> Result<Option<Operator>, ApiError> {
    operator
        .map(|op| op.parse::<Operator>())
        .transpose()
        .map_err(ApiError::bad_request)
}

fn target_width(state: &AppState, width: Option<u32>, resolution: Option<&str>) -> Result<u32, ApiError> {
    match (width, resolution) {
        (Some(width), _) => Ok(width),
        (None, Some(resolution)) => state
            .target_points
            .for_resolution(resolution)
            .ok_or_else(|| ApiError::bad_request(format!("unknown resolution: {}", resolution))),
        (None, None) => Ok(state.target_points.default),
    }
}

fn resolve_range(params: &SeriesParams) -> Result<TimeRange, PipelineError> {
    match (&params.range, &params.from, &params.to) {
        (Some(range), _, _) => TimeRange::parse_relative(range, Utc::now()),
        (None, Some(from), Some(to)) => TimeRange::parse_absolute(from, to),
        (None, None, None) => TimeRange::parse_relative(DEFAULT_RANGE, Utc::now()),
        _ => Err(PipelineError::InvalidRange(
            "from and to must be given together".to_string(),
        )),
    }
}

fn series_request(state: &AppState, params: &SeriesParams) -> Result<SeriesRequest, ApiError> {
    let range = resolve_range(params)?;
    Ok(SeriesRequest {
        pvs: split_pvs(&params.pvs),
        from: range.from(),
        to: range.to(),
        target_width: target_width(state, params.width, params.resolution.as_deref())?,
        operator: parse_operator(params.operator.as_deref())?,
    })
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Every supported operator with its parameters
pub async fn list_operators(headers: HeaderMap) -> Response {
    respond(StatusCode::OK, &REGISTRY, accepts_brotli(&headers)).await
}

/// Fetch, normalize and align a set of PVs over one window
pub async fn get_series(
    Query(params): Query<SeriesParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let request = match series_request(&state, &params) {
        Ok(request) => request,
        Err(err) => return respond_error(err, compress).await,
    };

    match state.pipeline.run(&request).await {
        Ok(outcome) => respond(StatusCode::OK, &outcome, compress).await,
        Err(err) => respond_error(err.into(), compress).await,
    }
}

/// The last matrix with at least one successful PV
pub async fn latest_series(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    match state.pipeline.last_matrix() {
        Some(matrix) => respond(StatusCode::OK, &matrix, compress).await,
        None => {
            let err = ApiError {
                status: StatusCode::NOT_FOUND,
                message: "no series has been assembled yet".to_string(),
            };
            respond_error(err, compress).await
        }
    }
}

/// Latest value of each PV at an instant
pub async fn current_values(
    Query(params): Query<CurrentParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let at = match params.at.as_deref() {
        None => Utc::now(),
        Some(raw) => match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(at) => at.with_timezone(&Utc),
            Err(e) => {
                let err = ApiError::bad_request(format!("invalid instant {}: {}", raw, e));
                return respond_error(err, compress).await;
            }
        },
    };

    match state.pipeline.current(&split_pvs(&params.pvs), at).await {
        Ok(values) => respond(StatusCode::OK, &values, compress).await,
        Err(err) => respond_error(err.into(), compress).await,
    }
}

fn live_frame(update: LiveUpdate) -> Value {
    match update {
        Ok(outcome) => serde_json::to_value(outcome)
            .unwrap_or_else(|e| json!({ "error": format!("serialization failed: {}", e) })),
        Err(err) => json!({ "error": err.to_string() }),
    }
}

/// Stream a live trailing window until the client disconnects
pub async fn stream_live(
    Query(params): Query<SeriesParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let settings = match target_width(&state, params.width, params.resolution.as_deref())
        .and_then(|width| Ok((width, parse_operator(params.operator.as_deref())?)))
    {
        Ok((width, operator)) => state.live.settings(width, operator),
        Err(err) => return respond_error(err, compress).await,
    };

    let pvs = split_pvs(&params.pvs);
    if pvs.is_empty() {
        return respond_error(PipelineError::NoPvs.into(), compress).await;
    }

    let (handle, rx) = LivePoller::spawn(state.pipeline.clone(), pvs, settings);
    stream_from_receiver(rx, live_frame, compress, handle.into_drop_guard()).into_response()
}
