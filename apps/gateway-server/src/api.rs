use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use insights_gateway::PipelineOutcome;
use insights_runtime::HealthReport;
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::Config, error::ApiResult, main_lib::AppState};

#[derive(Debug, Default, Deserialize)]
struct InsightRequest {
    #[serde(default)]
    symbol: String,
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

fn with_quota_headers(outcome: PipelineOutcome) -> Response {
    let mut response = Json(outcome.response).into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(outcome.quota.limit));
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from(outcome.quota.remaining),
    );
    response
}

async fn create_insight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<InsightRequest>, JsonRejection>,
) -> ApiResult<Response> {
    // Unreadable body: empty symbol, rejected after auth and quota.
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let outcome = state
        .pipeline
        .handle(authorization(&headers), &request.symbol)
        .await?;
    Ok(with_quota_headers(outcome))
}

async fn query_insight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<InsightRequest>, QueryRejection>,
) -> ApiResult<Response> {
    let request = query.map(|Query(request)| request).unwrap_or_default();
    let outcome = state
        .pipeline
        .handle(authorization(&headers), &request.symbol)
        .await?;
    Ok(with_quota_headers(outcome))
}

async fn get_insight(
    Path(request_id): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let outcome = state
        .pipeline
        .lookup(authorization(&headers), &request_id)
        .await?;
    Ok(with_quota_headers(outcome))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::now(state.pipeline.healthy().await);
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let parsed = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid GATEWAY_CORS_ALLOW_ORIGINS entry: '{origin}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(parsed))
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> anyhow::Result<Router> {
    let api = Router::new()
        .route("/insights", get(query_insight).post(create_insight))
        .route("/insights/{request_id}", get(get_insight))
        .route("/healthz", get(healthz))
        .route("/health", get(health));

    let router = Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors_layer(&config.cors_allow)?)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
