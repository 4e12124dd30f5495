//! Market Insights Gateway
//!
//! The public tier. [`GatewayPipeline`] runs every request through:
//!
//! ```text
//! AuthGuard -> RateLimiter -> SymbolValidator -> ResponseCache --miss--> Fetcher
//!                                                      ^                    |
//!                                                      +------- store ------+
//! ```
//!
//! Any stage may short-circuit with an `InsightsError`. Shared state (quota
//! counters and cached results) lives behind the `SharedStore` capability.

pub mod auth;
pub mod cache;
pub mod http_fetcher;
pub mod pipeline;
pub mod rate_limiter;

pub use auth::AuthGuard;
pub use cache::{fingerprint, CacheConfig, ResponseCache};
pub use http_fetcher::HttpFetcher;
pub use pipeline::{GatewayPipeline, PipelineConfig, PipelineOutcome};
pub use rate_limiter::{QuotaStatus, RateLimitConfig, RateLimiter};
