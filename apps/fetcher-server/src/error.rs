use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use insights_shared::InsightsError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Insights(#[from] InsightsError),
}

/// Same shape the gateway's `HttpFetcher` decodes.
#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Insights(err) = self;
        let kind = err.kind();
        let status =
            StatusCode::from_u16(kind.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!("Fetch failed with {}: {}", kind, err);
        } else {
            warn!("Fetch rejected with {}: {}", kind, err);
        }

        let mut response = (
            status,
            Json(ErrorBody {
                code: kind.code(),
                message: err.client_message(),
                status: status.as_u16(),
            }),
        )
            .into_response();

        if let Some(retry_after) = err.retry_after() {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}
