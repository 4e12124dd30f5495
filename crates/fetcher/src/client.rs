//! CoinMarketCap client.
//!
//! Builds the `/cryptocurrency/info` request, runs it through the [`UrlGuard`]
//! and [`Transport`] on every attempt, retries transient failures and turns
//! the response into a [`CryptoInsight`] or a typed [`InsightsError`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use insights_shared::{CryptoInsight, InsightsError, Symbol};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::ssrf::{ResolvedTarget, UrlGuard};
use crate::transport::{Transport, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://pro-api.coinmarketcap.com/v2";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";
/// Longest upstream body excerpt kept in error messages.
const MAX_ERROR_EXCERPT: usize = 200;

// ============================================================================
// API Response Structures
// ============================================================================

/// Envelope of `/cryptocurrency/info`
#[derive(Debug, Deserialize)]
struct InfoResponse {
    data: Option<HashMap<String, Value>>,
}

/// A `data` entry is an object, or a list of objects when a slug is ambiguous
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InfoEntry {
    One(CoinInfo),
    Many(Vec<CoinInfo>),
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
    name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    date_launched: Option<String>,
    logo: Option<String>,
    platform: Option<PlatformInfo>,
    self_reported_market_cap: Option<serde_json::Number>,
    self_reported_circulating_supply: Option<serde_json::Number>,
}

#[derive(Debug, Deserialize)]
struct PlatformInfo {
    name: Option<String>,
}

/// Error envelope CoinMarketCap uses on non-2xx responses
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    error_message: Option<String>,
}

// ============================================================================
// UpstreamClient
// ============================================================================

/// Upstream settings.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// API root, e.g. `https://pro-api.coinmarketcap.com/v2`
    pub base_url: String,
    pub api_key: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl UpstreamConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// SSRF-guarded, retrying client for the upstream market-data API.
pub struct UpstreamClient {
    config: UpstreamConfig,
    guard: UrlGuard,
    transport: Arc<dyn Transport>,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig, guard: UrlGuard, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            guard,
            transport,
        }
    }

    /// Info endpoint URL for `symbol`.
    pub fn info_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/cryptocurrency/info?slug={}",
            self.config.base_url.trim_end_matches('/'),
            symbol.slug()
        )
    }

    /// Fetch and normalize the insight for `symbol`.
    ///
    /// The URL is re-validated before every attempt. Transient failures are
    /// retried per the configured [`RetryPolicy`]; the last error is returned
    /// once the budget is spent.
    pub async fn fetch(&self, symbol: &Symbol) -> Result<CryptoInsight, InsightsError> {
        let url = self.info_url(symbol);
        let mut retry = RetryState::new(self.config.retry.clone());

        info!("Fetching {} from upstream", symbol);

        loop {
            let outcome = match self.guard.check(&url).await {
                Ok(target) => self.attempt(&target, symbol).await,
                Err(e) => Err(e),
            };

            let err = match outcome {
                Ok(insight) => {
                    debug!(
                        "Fetched {} after {} failed attempt(s), {:?} backoff",
                        symbol,
                        retry.attempts(),
                        retry.total_backoff()
                    );
                    return Ok(insight);
                }
                Err(e) => e,
            };

            match retry.on_failure(&err) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        "Upstream attempt {} for {} failed ({}), retrying in {:?}",
                        retry.attempts(),
                        symbol,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    error!(
                        "Upstream fetch for {} failed after {} attempt(s): {}",
                        symbol,
                        retry.attempts(),
                        err
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        target: &ResolvedTarget,
        symbol: &Symbol,
    ) -> Result<CryptoInsight, InsightsError> {
        let headers = [
            (API_KEY_HEADER, self.config.api_key.clone()),
            ("Accept", "application/json".to_string()),
        ];

        let response = self
            .transport
            .get(target, &headers, self.config.timeout)
            .await
            .map_err(classify_transport)?;

        if !(200..300).contains(&response.status) {
            return Err(classify_status(
                response.status,
                &response.body,
                response.retry_after,
            ));
        }

        normalize(symbol, &response.body, Utc::now())
    }
}

fn classify_transport(error: TransportError) -> InsightsError {
    match error {
        TransportError::Timeout(after) => {
            InsightsError::UpstreamTimeout(format!("no response within {after:?}"))
        }
        TransportError::Connect(message) => InsightsError::UpstreamUnreachable(message),
    }
}

/// Map a non-2xx upstream response to its error kind.
///
/// | Status | Error |
/// |--------|-------|
/// | 400, 422 | `UpstreamBadRequest` |
/// | 401, 403 | `UpstreamUnauthorized` |
/// | 404 | `UpstreamNotFound` |
/// | 429 | `UpstreamRateLimited` |
/// | 5xx | `UpstreamServerError` |
/// | anything else | `UpstreamBadRequest` |
pub fn classify_status(status: u16, body: &[u8], retry_after: Option<Duration>) -> InsightsError {
    let detail = || format!("HTTP {status}: {}", upstream_message(body));
    match status {
        400 | 422 => InsightsError::UpstreamBadRequest(detail()),
        401 | 403 => InsightsError::UpstreamUnauthorized(detail()),
        404 => InsightsError::UpstreamNotFound(detail()),
        429 => InsightsError::UpstreamRateLimited { retry_after },
        500..=599 => InsightsError::UpstreamServerError(detail()),
        _ => InsightsError::UpstreamBadRequest(detail()),
    }
}

/// The API's `status.error_message`, or a short excerpt of the raw body.
fn upstream_message(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<StatusEnvelope>(body) {
        if let Some(message) = envelope.status.error_message {
            return message;
        }
    }
    String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_EXCERPT)
        .collect()
}

fn malformed(message: impl Into<String>) -> InsightsError {
    InsightsError::UpstreamMalformedResponse(message.into())
}

/// Validate a 2xx body and build the normalized insight.
///
/// The `data` object must hold an entry keyed by the symbol's slug or its
/// CoinMarketCap id, with non-negative numeric self-reported market cap and
/// circulating supply.
pub fn normalize(
    symbol: &Symbol,
    body: &[u8],
    fetched_at: DateTime<Utc>,
) -> Result<CryptoInsight, InsightsError> {
    let response: InfoResponse =
        serde_json::from_slice(body).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let data = response
        .data
        .ok_or_else(|| malformed("response has no 'data' object"))?;

    let raw_entry = data
        .get(symbol.slug())
        .or_else(|| data.get(&symbol.cmc_id().to_string()))
        .ok_or_else(|| malformed(format!("no entry for '{}'", symbol.slug())))?;

    let info = match serde_json::from_value::<InfoEntry>(raw_entry.clone()) {
        Ok(InfoEntry::One(info)) => info,
        Ok(InfoEntry::Many(list)) => list
            .into_iter()
            .next()
            .ok_or_else(|| malformed(format!("empty entry list for '{}'", symbol.slug())))?,
        Err(e) => return Err(malformed(format!("unexpected entry shape: {e}"))),
    };

    let market_cap = required_amount(info.self_reported_market_cap, "self_reported_market_cap")?;
    let circulating_supply = required_amount(
        info.self_reported_circulating_supply,
        "self_reported_circulating_supply",
    )?;

    let price = if circulating_supply.is_zero() {
        None
    } else {
        market_cap.checked_div(circulating_supply)
    };

    Ok(CryptoInsight {
        symbol: symbol.slug().to_string(),
        name: info.name.unwrap_or_else(|| capitalize(symbol.slug())),
        category: info.category,
        description: info.description,
        date_launched: info.date_launched,
        logo: info.logo,
        platform: info.platform.and_then(|platform| platform.name),
        circulating_supply,
        market_cap,
        price,
        fetched_at,
    })
}

fn required_amount(
    value: Option<serde_json::Number>,
    field: &str,
) -> Result<Decimal, InsightsError> {
    let number = value.ok_or_else(|| malformed(format!("missing '{field}'")))?;
    let text = number.to_string();
    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| malformed(format!("'{field}' is not a decimal: {text}")))?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(malformed(format!("'{field}' is negative: {text}")));
    }
    Ok(amount)
}

fn capitalize(slug: &str) -> String {
    let mut chars = slug.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
