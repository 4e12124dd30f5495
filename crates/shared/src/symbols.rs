//! Symbol normalization and allow-list validation.
//!
//! Both tiers validate symbols before any cache or network access. A symbol is
//! accepted either as its CoinMarketCap slug (`bitcoin`) or its ticker (`BTC`);
//! the canonical form is always the slug.

use serde::{Serialize, Serializer};

use crate::errors::InsightsError;

/// An allow-listed currency symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    slug: &'static str,
    ticker: &'static str,
    cmc_id: u32,
}

impl Symbol {
    const fn new(slug: &'static str, ticker: &'static str, cmc_id: u32) -> Self {
        Self {
            slug,
            ticker,
            cmc_id,
        }
    }

    /// Canonical identifier, as used by the upstream API and cache keys.
    pub fn slug(&self) -> &'static str {
        self.slug
    }

    /// Lower-case ticker alias.
    pub fn ticker(&self) -> &'static str {
        self.ticker
    }

    /// CoinMarketCap numeric id.
    pub fn cmc_id(&self) -> u32 {
        self.cmc_id
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.slug)
    }
}

/// Symbols the services accept.
pub const SUPPORTED_SYMBOLS: &[Symbol] = &[
    Symbol::new("bitcoin", "btc", 1),
    Symbol::new("ethereum", "eth", 1027),
    Symbol::new("cardano", "ada", 2010),
    Symbol::new("solana", "sol", 5426),
    Symbol::new("polkadot", "dot", 6636),
];

/// Comma separated list of accepted slugs, for error messages.
pub fn allowed_list() -> String {
    SUPPORTED_SYMBOLS
        .iter()
        .map(Symbol::slug)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates raw symbols against [`SUPPORTED_SYMBOLS`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SymbolValidator;

impl SymbolValidator {
    pub fn new() -> Self {
        Self
    }

    /// Normalize `raw` and resolve it to a supported [`Symbol`].
    ///
    /// # Errors
    ///
    /// [`InsightsError::InvalidSymbol`] when the trimmed, lower-cased value is
    /// empty, contains anything outside `[a-z0-9-]`, or is not allow-listed.
    pub fn validate(&self, raw: &str) -> Result<Symbol, InsightsError> {
        let normalized = raw.trim().to_ascii_lowercase();

        let well_formed = !normalized.is_empty()
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        let found = well_formed
            .then(|| {
                SUPPORTED_SYMBOLS
                    .iter()
                    .find(|s| s.slug == normalized || s.ticker == normalized)
            })
            .flatten();

        found.copied().ok_or_else(|| InsightsError::InvalidSymbol {
            symbol: raw.to_string(),
            allowed: allowed_list(),
        })
    }

    /// The symbols this validator accepts.
    pub fn supported(&self) -> &'static [Symbol] {
        SUPPORTED_SYMBOLS
    }
}
