//! Request and response models
//!
//! - `identity` - caller identity derived from a validated credential
//! - `insight` - normalized upstream result and the gateway response envelope

mod identity;
mod insight;

pub use identity::Identity;
pub use insight::{CachedInsight, CryptoInsight, InsightResponse};
