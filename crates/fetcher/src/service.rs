use std::sync::Arc;

use async_trait::async_trait;
use insights_shared::{CryptoInsight, Fetcher, InsightsError, Symbol, SymbolValidator};
use tracing::info;

use crate::client::{UpstreamClient, UpstreamConfig};
use crate::ssrf::{UrlGuard, UrlGuardConfig};
use crate::transport::ReqwestTransport;

/// Fetcher tier entry point: symbol validation in front of the upstream client.
pub struct FetcherService {
    validator: SymbolValidator,
    client: UpstreamClient,
}

impl FetcherService {
    pub fn new(client: UpstreamClient) -> Self {
        Self {
            validator: SymbolValidator::new(),
            client,
        }
    }

    /// Production wiring: system DNS and the reqwest transport.
    pub fn with_defaults(upstream: UpstreamConfig, guard: UrlGuardConfig) -> Self {
        let client = UpstreamClient::new(
            upstream,
            UrlGuard::with_dns(guard),
            Arc::new(ReqwestTransport),
        );
        Self::new(client)
    }

    /// Validate a raw symbol from a request, then fetch it.
    pub async fn fetch_raw(&self, raw_symbol: &str) -> Result<CryptoInsight, InsightsError> {
        let symbol = self.validator.validate(raw_symbol)?;
        self.fetch(&symbol).await
    }
}

#[async_trait]
impl Fetcher for FetcherService {
    async fn fetch(&self, symbol: &Symbol) -> Result<CryptoInsight, InsightsError> {
        let started = std::time::Instant::now();
        let result = self.client.fetch(symbol).await;
        if result.is_ok() {
            info!("Fetched {} in {:?}", symbol, started.elapsed());
        }
        result
    }
}
