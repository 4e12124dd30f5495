use async_trait::async_trait;

use crate::errors::InsightsError;
use crate::models::CryptoInsight;
use crate::symbols::Symbol;

/// Retrieves a fresh insight for an already validated symbol.
///
/// The gateway forwards cache misses through this trait. It is implemented
/// in-process by the fetcher crate's service and over HTTP by the gateway's
/// client for the internal fetcher endpoint.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, symbol: &Symbol) -> Result<CryptoInsight, InsightsError>;
}
