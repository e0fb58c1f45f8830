// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    current_values, get_series, health_check, latest_series, list_operators, stream_live,
};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Compression is handled per response, so no CompressionLayer here.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/operators", get(list_operators))
        .route("/series", get(get_series))
        .route("/series/latest", get(latest_series))
        .route("/current", get(current_values))
        .route("/live", get(stream_live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
