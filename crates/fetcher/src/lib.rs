//! Market Insights Fetcher
//!
//! The internal tier that talks to CoinMarketCap. Every outbound call goes
//! through three stages:
//!
//! 1. [`UrlGuard`] - parses the target URL, checks scheme and host against the
//!    allow-list and rejects any non-public resolved address
//! 2. [`Transport`] - dials exactly the addresses the guard approved, with a
//!    per-attempt timeout and no redirects
//! 3. [`UpstreamClient`] - classifies the response, retries transient failures
//!    via [`RetryState`] and normalizes the body into a `CryptoInsight`
//!
//! [`FetcherService`] puts symbol validation in front and implements the
//! shared `Fetcher` trait.

pub mod client;
pub mod retry;
pub mod service;
pub mod ssrf;
pub mod transport;

pub use client::{classify_status, normalize, UpstreamClient, UpstreamConfig, DEFAULT_BASE_URL};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use service::FetcherService;
pub use ssrf::{is_public_ip, DnsResolver, HostResolver, ResolvedTarget, UrlGuard, UrlGuardConfig};
pub use transport::{parse_retry_after, RawResponse, ReqwestTransport, Transport, TransportError};
