//! HTTP transport for upstream attempts.
//!
//! The [`Transport`] trait is the only place the fetcher touches the network
//! after DNS. [`ReqwestTransport`] pins the request to the addresses in the
//! [`ResolvedTarget`] and never follows redirects, so the validated address is
//! the one that gets dialed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Host;

use crate::ssrf::ResolvedTarget;

/// Status, backoff hint and body of an upstream response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed `Retry-After` header (delta-seconds form)
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

/// Failures below the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),
}

/// Sends a GET to a validated target.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        target: &ResolvedTarget,
        headers: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Reqwest-backed transport.
///
/// A client is built per attempt because the pinned addresses change with
/// every guard check.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    fn client_for(target: &ResolvedTarget, timeout: Duration) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout);

        // Overrides are matched against the host exactly as the URL spells it.
        if let Some(Host::Domain(domain)) = target.url.host() {
            builder = builder.resolve_to_addrs(domain, &target.addrs);
        }

        builder
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {e}")))
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connect(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        target: &ResolvedTarget,
        headers: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let client = Self::client_for(target, timeout)?;

        let mut request = client.get(target.url.clone());
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        debug!("Upstream GET {} via {:?}", target.url.path(), target.addrs);

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        Ok(RawResponse {
            status,
            retry_after,
            body: body.to_vec(),
        })
    }
}

/// Parse the delta-seconds form of `Retry-After`. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
