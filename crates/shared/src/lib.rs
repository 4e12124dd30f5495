//! Market Insights Shared Crate
//!
//! Types and capabilities shared by the gateway and fetcher tiers.
//!
//! # Overview
//!
//! - [`Symbol`] / [`SymbolValidator`] - canonical, allow-listed currency symbols
//! - [`CryptoInsight`] - the normalized upstream result served to callers
//! - [`InsightsError`] / [`ErrorKind`] - the closed error taxonomy with stable codes
//! - [`SharedStore`] - atomic counter and TTL key-value capability
//! - [`MemoryStore`] - in-process implementation of [`SharedStore`]
//! - [`Clock`] - injectable time source
//! - [`Fetcher`] - the collaborator interface the gateway forwards cache misses to
//!
//! # Request Flow
//!
//! ```text
//! Gateway:  AuthGuard -> RateLimiter -> SymbolValidator -> ResponseCache --miss--> Fetcher
//! Fetcher:  SymbolValidator -> UrlGuard -> UpstreamClient -> CryptoInsight
//! ```

pub mod clock;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod store;
pub mod symbols;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ErrorKind, InsightsError, RetryClass};
pub use fetcher::Fetcher;
pub use models::{CachedInsight, CryptoInsight, Identity, InsightResponse};
pub use store::{MemoryStore, SharedStore, StoreError};
pub use symbols::{Symbol, SymbolValidator, SUPPORTED_SYMBOLS};
