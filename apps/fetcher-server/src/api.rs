use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use insights_runtime::HealthReport;
use insights_shared::CryptoInsight;
use serde::Deserialize;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::Config, error::ApiResult, main_lib::AppState};

#[derive(Debug, Default, Deserialize)]
struct FetchQuery {
    #[serde(default)]
    symbol: String,
}

async fn fetch_insight(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FetchQuery>, QueryRejection>,
) -> ApiResult<Json<CryptoInsight>> {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let insight = state.service.fetch_raw(&query.symbol).await?;
    Ok(Json(insight))
}

async fn healthz() -> &'static str {
    "ok"
}

// Holds no stores, so it is healthy whenever it can answer.
async fn health() -> Json<HealthReport> {
    Json(HealthReport::now(true))
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let api = Router::new()
        .route("/fetch", get(fetch_insight))
        .route("/healthz", get(healthz))
        .route("/health", get(health));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
