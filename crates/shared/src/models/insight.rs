use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized cryptocurrency insight built from the upstream API response.
///
/// Only constructed after the upstream body passed validation, so required
/// fields are always populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CryptoInsight {
    /// Canonical symbol slug (e.g. `bitcoin`)
    pub symbol: String,

    /// Display name
    pub name: String,

    /// Category such as `coin` or `token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_launched: Option<String>,

    /// Logo URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,

    /// Name of the hosting platform, for tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Self-reported circulating supply
    pub circulating_supply: Decimal,

    /// Self-reported market capitalization
    pub market_cap: Decimal,

    /// Implied unit price (`market_cap / circulating_supply`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// When the fetcher retrieved the data
    pub fetched_at: DateTime<Utc>,
}

/// Payload stored in the response cache under `result:{request_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedInsight {
    pub request_id: String,
    pub data: CryptoInsight,
    pub fetched_at: DateTime<Utc>,
}

/// Gateway success body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    /// Id under which the result can be fetched again while cached
    pub request_id: String,
    pub symbol: String,
    pub data: CryptoInsight,
    /// Whether the result was served from cache
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
}

impl InsightResponse {
    pub fn from_cached(entry: CachedInsight) -> Self {
        Self {
            request_id: entry.request_id,
            symbol: entry.data.symbol.clone(),
            fetched_at: entry.fetched_at,
            data: entry.data,
            cached: true,
        }
    }

    pub fn fresh(request_id: String, data: CryptoInsight) -> Self {
        Self {
            request_id,
            symbol: data.symbol.clone(),
            fetched_at: data.fetched_at,
            data,
            cached: false,
        }
    }
}
