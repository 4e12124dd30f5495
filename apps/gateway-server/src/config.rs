use std::{net::SocketAddr, time::Duration};

use anyhow::bail;
use insights_runtime::env::{list, parse_flag, parse_or, required};

pub struct Config {
    pub listen_addr: SocketAddr,
    pub api_token: String,
    pub fetcher_url: String,
    pub fetcher_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_partition_by_identity: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_window: Duration,
    pub request_timeout: Duration,
    pub cors_allow: Vec<String>,
    pub sweep_interval: Duration,
}

impl Config {
    /// Load from the process environment, after `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_token = required(&lookup, "GATEWAY_API_TOKEN")?;

        let rate_limit_requests: u64 = parse_or(&lookup, "RATE_LIMIT_REQUESTS", 10)?;
        let window_secs: u64 = parse_or(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 60)?;
        if window_secs == 0 {
            bail!("RATE_LIMIT_WINDOW_SECONDS must be greater than zero");
        }

        let cors_allow =
            list(&lookup, "GATEWAY_CORS_ALLOW_ORIGINS").unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            listen_addr: parse_or(&lookup, "GATEWAY_LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            api_token,
            fetcher_url: lookup("FETCHER_URL").unwrap_or_else(|| "http://localhost:8001".into()),
            fetcher_timeout: Duration::from_millis(parse_or(&lookup, "FETCHER_TIMEOUT_MS", 10_000)?),
            cache_ttl: Duration::from_secs(parse_or(&lookup, "CACHE_TTL_SECONDS", 600)?),
            cache_partition_by_identity: parse_flag(&lookup, "CACHE_PARTITION_BY_IDENTITY", false)?,
            rate_limit_requests,
            rate_limit_window: Duration::from_secs(window_secs),
            request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "GATEWAY_REQUEST_TIMEOUT_MS",
                30_000,
            )?),
            cors_allow,
            sweep_interval: Duration::from_secs(
                parse_or::<u64>(&lookup, "STORE_SWEEP_INTERVAL_SECONDS", 60)?.max(1),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("GATEWAY_API_TOKEN", "t")])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.fetcher_url, "http://localhost:8001");
        assert_eq!(config.fetcher_timeout, Duration::from_secs(10));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert!(!config.cache_partition_by_identity);
        assert_eq!(config.rate_limit_requests, 10);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.cors_allow, vec!["*".to_string()]);
    }

    #[test]
    fn test_missing_token_fails() {
        let err = Config::from_lookup(lookup(&[])).err().unwrap();
        assert!(err.to_string().contains("GATEWAY_API_TOKEN"));

        let err = Config::from_lookup(lookup(&[("GATEWAY_API_TOKEN", "  ")])).err().unwrap();
        assert!(err.to_string().contains("GATEWAY_API_TOKEN"));
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let config = Config::from_lookup(lookup(&[
            ("GATEWAY_API_TOKEN", "t"),
            ("RATE_LIMIT_REQUESTS", "25"),
            ("CACHE_PARTITION_BY_IDENTITY", "yes"),
            ("GATEWAY_CORS_ALLOW_ORIGINS", "https://a.example, https://b.example"),
        ]))
        .unwrap();
        assert_eq!(config.rate_limit_requests, 25);
        assert!(config.cache_partition_by_identity);
        assert_eq!(config.cors_allow.len(), 2);

        let err = Config::from_lookup(lookup(&[
            ("GATEWAY_API_TOKEN", "t"),
            ("CACHE_TTL_SECONDS", "ten"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("CACHE_TTL_SECONDS"));

        assert!(Config::from_lookup(lookup(&[
            ("GATEWAY_API_TOKEN", "t"),
            ("RATE_LIMIT_WINDOW_SECONDS", "0"),
        ]))
        .is_err());
    }
}
