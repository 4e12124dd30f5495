use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use insights_fetcher::{RetryPolicy, UpstreamConfig, UrlGuardConfig, DEFAULT_BASE_URL};
use insights_runtime::env::{list, parse_flag, parse_or, required};
use url::Url;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub base_url: String,
    pub api_key: String,
    pub upstream_timeout: Duration,
    pub retry: RetryPolicy,
    /// Defaults to the base URL's host
    pub allowed_hosts: Vec<String>,
    /// Scheme of the base URL; the guard only lets this one through
    pub scheme: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = required(&lookup, "COINMARKETCAP_API_KEY")?;

        let base_url = lookup("COINMARKETCAP_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("Invalid COINMARKETCAP_BASE_URL: '{base_url}'"))?;
        let Some(base_host) = parsed.host_str().map(str::to_ascii_lowercase) else {
            bail!("COINMARKETCAP_BASE_URL has no host: '{base_url}'");
        };

        let allowed_hosts: Vec<String> = match list(&lookup, "UPSTREAM_ALLOWED_HOSTS") {
            Some(hosts) => hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
            None => vec![base_host.clone()],
        };
        if !allowed_hosts.contains(&base_host) {
            bail!("UPSTREAM_ALLOWED_HOSTS does not include the base URL host '{base_host}'");
        }

        let max_attempts: u32 = parse_or(&lookup, "UPSTREAM_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            bail!("UPSTREAM_MAX_ATTEMPTS must be at least 1");
        }
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_or(&lookup, "UPSTREAM_BACKOFF_BASE_MS", 500)?),
            max_delay: Duration::from_millis(parse_or(&lookup, "UPSTREAM_BACKOFF_MAX_MS", 8_000)?),
            jitter: parse_flag(&lookup, "UPSTREAM_BACKOFF_JITTER", true)?,
        };

        Ok(Self {
            listen_addr: parse_or(&lookup, "FETCHER_LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8001)))?,
            scheme: parsed.scheme().to_string(),
            base_url,
            api_key,
            upstream_timeout: Duration::from_millis(parse_or(&lookup, "UPSTREAM_TIMEOUT_MS", 10_000)?),
            retry,
            allowed_hosts,
            request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "FETCHER_REQUEST_TIMEOUT_MS",
                45_000,
            )?),
        })
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout: self.upstream_timeout,
            retry: self.retry.clone(),
        }
    }

    pub fn url_guard(&self) -> UrlGuardConfig {
        UrlGuardConfig::new(self.allowed_hosts.iter().cloned()).with_scheme(&self.scheme)
    }
}
