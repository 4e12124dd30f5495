use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use insights_gateway::{
    AuthGuard, CacheConfig, GatewayPipeline, HttpFetcher, PipelineConfig, RateLimitConfig,
    RateLimiter, ResponseCache,
};
use insights_shared::{Fetcher, MemoryStore};
use tokio::task::JoinHandle;

use crate::config::Config;

pub struct AppState {
    pub pipeline: GatewayPipeline,
    /// Cached results and their request-id pointers
    pub cache_store: Arc<MemoryStore>,
    /// Per-identity quota counters
    pub limiter_store: Arc<MemoryStore>,
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let parsed = url::Url::parse(&config.fetcher_url)
        .with_context(|| format!("Invalid FETCHER_URL: '{}'", config.fetcher_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("FETCHER_URL must be http or https, got '{}'", parsed.scheme());
    }
    let fetcher = Arc::new(HttpFetcher::new(&config.fetcher_url, config.fetcher_timeout));
    tracing::info!("Forwarding cache misses to {}", config.fetcher_url);
    Ok(build_state_with_fetcher(config, fetcher))
}

/// Wire the pipeline around an arbitrary [`Fetcher`].
pub fn build_state_with_fetcher(config: &Config, fetcher: Arc<dyn Fetcher>) -> Arc<AppState> {
    let cache_store = Arc::new(MemoryStore::new());
    let limiter_store = Arc::new(MemoryStore::new());

    let limiter = RateLimiter::new(
        limiter_store.clone(),
        RateLimitConfig {
            quota: config.rate_limit_requests,
            window: config.rate_limit_window,
        },
    );
    let cache = ResponseCache::new(
        cache_store.clone(),
        CacheConfig {
            ttl: config.cache_ttl,
            partition_by_identity: config.cache_partition_by_identity,
        },
    );
    let pipeline = GatewayPipeline::new(
        AuthGuard::new(&config.api_token),
        limiter,
        cache,
        fetcher,
        PipelineConfig {
            fetch_timeout: config.fetcher_timeout,
        },
    );

    Arc::new(AppState {
        pipeline,
        cache_store,
        limiter_store,
    })
}

/// Periodically drop expired entries from the in-memory stores.
pub fn spawn_store_sweeper(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = state.cache_store.sweep_expired() + state.limiter_store.sweep_expired();
            if removed > 0 {
                tracing::debug!("Swept {} expired store entries", removed);
            }
        }
    })
}
