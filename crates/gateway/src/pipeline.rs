//! The gateway decision chain.
//!
//! ```text
//! Unauthenticated -> Authenticated -> WithinQuota -> SymbolValid
//!     -> CacheHit                          -> Responded
//!     -> CacheMiss -> Fetched -> Stored    -> Responded
//! ```
//!
//! Every stage may short-circuit. Quota is consumed before the cache lookup,
//! so cache hits count against it; rejected requests never reach the cache or
//! the fetcher.

use std::sync::Arc;
use std::time::Duration;

use insights_shared::{Fetcher, Identity, InsightResponse, InsightsError, SymbolValidator};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthGuard;
use crate::cache::ResponseCache;
use crate::rate_limiter::{QuotaStatus, RateLimiter};

/// Pipeline settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Caller-facing bound on a single fetcher call
    pub fetch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// A served request: the body plus the caller's quota after it.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutcome {
    pub response: InsightResponse,
    pub quota: QuotaStatus,
}

pub struct GatewayPipeline {
    auth: AuthGuard,
    limiter: RateLimiter,
    validator: SymbolValidator,
    cache: ResponseCache,
    fetcher: Arc<dyn Fetcher>,
    config: PipelineConfig,
}

impl GatewayPipeline {
    pub fn new(
        auth: AuthGuard,
        limiter: RateLimiter,
        cache: ResponseCache,
        fetcher: Arc<dyn Fetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            auth,
            limiter,
            validator: SymbolValidator::new(),
            cache,
            fetcher,
            config,
        }
    }

    /// Serve an insight request for `raw_symbol`.
    pub async fn handle(
        &self,
        authorization: Option<&str>,
        raw_symbol: &str,
    ) -> Result<PipelineOutcome, InsightsError> {
        let (identity, quota) = self.admit(authorization).await?;

        let symbol = self.validator.validate(raw_symbol)?;
        let fingerprint = self.cache.fingerprint_for(&symbol, &identity);

        if let Some(entry) = self.cache.get(&fingerprint, &identity).await {
            debug!("Cache hit for {} ({})", symbol, identity);
            return Ok(PipelineOutcome {
                response: InsightResponse::from_cached(entry),
                quota,
            });
        }

        info!("Cache miss for {} ({}), forwarding to fetcher", symbol, identity);

        let data = tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(&symbol))
            .await
            .map_err(|_| {
                warn!(
                    "Fetcher did not answer for {} within {:?}",
                    symbol, self.config.fetch_timeout
                );
                InsightsError::GatewayTimeout
            })??;

        let request_id = Uuid::new_v4().to_string();
        self.cache.put(&fingerprint, &identity, &request_id, &data).await;

        Ok(PipelineOutcome {
            response: InsightResponse::fresh(request_id, data),
            quota,
        })
    }

    /// Serve a previously returned result by its request id.
    pub async fn lookup(
        &self,
        authorization: Option<&str>,
        request_id: &str,
    ) -> Result<PipelineOutcome, InsightsError> {
        let (identity, quota) = self.admit(authorization).await?;

        let entry = self
            .cache
            .get_by_request_id(request_id.trim(), &identity)
            .await
            .ok_or_else(|| InsightsError::InsightNotFound(request_id.to_string()))?;

        Ok(PipelineOutcome {
            response: InsightResponse::from_cached(entry),
            quota,
        })
    }

    /// Whether the backing stores answer.
    pub async fn healthy(&self) -> bool {
        let cache = self.cache.ping().await;
        let limiter = self.limiter.ping().await;
        if let Err(e) = cache.as_ref().and(limiter.as_ref()) {
            warn!("Health check: store unavailable: {}", e);
            return false;
        }
        true
    }

    async fn admit(
        &self,
        authorization: Option<&str>,
    ) -> Result<(Identity, QuotaStatus), InsightsError> {
        let identity = self
            .auth
            .authenticate(authorization)
            .inspect_err(|e| warn!("Rejected request: {}", e))?;
        let quota = self.limiter.check(&identity).await?;
        Ok((identity, quota))
    }
}
