//! [`Fetcher`] over HTTP, for a gateway deployed apart from the fetcher tier.

use std::time::Duration;

use async_trait::async_trait;
use insights_shared::{CryptoInsight, ErrorKind, Fetcher, InsightsError, Symbol};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Error body rendered by the fetcher service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Calls `GET {base_url}/api/v1/fetch?symbol=<slug>` on the fetcher service.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = client_or_default(Client::builder().timeout(timeout).build(), timeout);

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn fetch_url(&self) -> String {
        format!("{}/api/v1/fetch", self.base_url.trim_end_matches('/'))
    }
}

/// Fall back on reqwest's defaults when the tuned client cannot be built.
/// The fallback has no overall timeout; the pipeline's own deadline still applies.
fn client_or_default(built: reqwest::Result<Client>, timeout: Duration) -> Client {
    built.unwrap_or_else(|e| {
        warn!(
            "Failed to build fetcher HTTP client with timeout {:?}, using defaults: {}",
            timeout, e
        );
        Client::new()
    })
}

fn map_send_error(error: reqwest::Error) -> InsightsError {
    if error.is_timeout() {
        InsightsError::GatewayTimeout
    } else {
        InsightsError::UpstreamUnreachable(format!("fetcher service: {error}"))
    }
}

/// Recover the fetcher's error kind from its response.
///
/// Unknown codes fall back on the status class.
fn error_from_response(status: u16, body: &[u8]) -> InsightsError {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(kind) = ErrorKind::from_code(&parsed.code) {
            return InsightsError::from_kind(kind, parsed.message);
        }
        warn!("Fetcher returned unknown error code {}", parsed.code);
    }

    let detail = format!("fetcher service returned HTTP {status}");
    if status >= 500 {
        InsightsError::UpstreamServerError(detail)
    } else {
        InsightsError::UpstreamBadRequest(detail)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, symbol: &Symbol) -> Result<CryptoInsight, InsightsError> {
        debug!("Forwarding {} to fetcher service", symbol);

        let response = self
            .client
            .get(self.fetch_url())
            .query(&[("symbol", symbol.slug())])
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        serde_json::from_slice::<CryptoInsight>(&body).map_err(|e| {
            InsightsError::UpstreamMalformedResponse(format!("fetcher service body: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use insights_shared::SymbolValidator;
    use serde_json::json;

    fn bitcoin() -> Symbol {
        SymbolValidator::new().validate("bitcoin").unwrap()
    }

    fn insight_json() -> serde_json::Value {
        json!({
            "symbol": "bitcoin",
            "name": "Bitcoin",
            "circulating_supply": 19500000.0,
            "market_cap": 1170000000000.0,
            "price": 60000.0,
            "fetched_at": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_forwards_symbol_and_parses_insight() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/fetch")
                    .query_param("symbol", "bitcoin");
                then.status(200).json_body(insight_json());
            })
            .await;

        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_secs(5));
        let insight = fetcher.fetch(&bitcoin()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(insight.symbol, "bitcoin");
        assert_eq!(insight.name, "Bitcoin");
    }

    #[tokio::test]
    async fn test_recovers_error_kind_from_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(502).json_body(json!({
                    "code": "UPSTREAM_NOT_FOUND",
                    "message": "Requested data not found upstream",
                    "status": 502
                }));
            })
            .await;

        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_secs(5));
        let err = fetcher.fetch(&bitcoin()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamNotFound);
    }

    #[tokio::test]
    async fn test_unknown_error_body_falls_back_on_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(500).body("Internal Server Error");
            })
            .await;
        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_secs(5));
        assert_eq!(
            fetcher.fetch(&bitcoin()).await.unwrap_err().kind(),
            ErrorKind::UpstreamServerError
        );

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(404).json_body(json!({"code": "NO_SUCH_CODE"}));
            })
            .await;
        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_secs(5));
        assert_eq!(
            fetcher.fetch(&bitcoin()).await.unwrap_err().kind(),
            ErrorKind::UpstreamBadRequest
        );
    }

    #[tokio::test]
    async fn test_unparsable_success_body_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(200).json_body(json!({"symbol": "bitcoin"}));
            })
            .await;

        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_secs(5));
        assert_eq!(
            fetcher.fetch(&bitcoin()).await.unwrap_err().kind(),
            ErrorKind::UpstreamMalformedResponse
        );
    }

    #[tokio::test]
    async fn test_slow_fetcher_is_gateway_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(200)
                    .json_body(insight_json())
                    .delay(Duration::from_millis(500));
            })
            .await;

        let fetcher = HttpFetcher::new(server.base_url(), Duration::from_millis(50));
        assert_eq!(
            fetcher.fetch(&bitcoin()).await.unwrap_err(),
            InsightsError::GatewayTimeout
        );
    }

    #[tokio::test]
    async fn test_unreachable_fetcher() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(format!("http://{addr}"), Duration::from_secs(2));
        assert_eq!(
            fetcher.fetch(&bitcoin()).await.unwrap_err().kind(),
            ErrorKind::UpstreamUnreachable
        );
    }

    #[tokio::test]
    async fn test_unbuildable_client_falls_back_to_defaults() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/fetch");
                then.status(200).json_body(insight_json());
            })
            .await;

        // A header value with a newline makes the builder fail.
        let broken = Client::builder().user_agent("bad\nagent").build();
        assert!(broken.is_err());

        let fetcher = HttpFetcher {
            client: client_or_default(broken, Duration::from_secs(5)),
            base_url: server.base_url(),
        };
        assert_eq!(fetcher.fetch(&bitcoin()).await.unwrap().name, "Bitcoin");
    }
}
