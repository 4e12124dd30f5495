//! Outbound URL validation.
//!
//! [`UrlGuard::check`] runs before every upstream attempt. It accepts a URL
//! only when the scheme matches, no credentials are embedded, the host is on
//! the allow-list and every address the host resolves to is publicly routable.
//! The returned [`ResolvedTarget`] carries those addresses so the transport
//! dials exactly what was validated.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use insights_shared::InsightsError;
use tracing::warn;
use url::{Host, Url};

/// Resolves a host name to socket addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// System DNS via tokio.
#[derive(Clone, Copy, Debug, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }
}

/// Guard settings.
#[derive(Clone, Debug)]
pub struct UrlGuardConfig {
    /// Required scheme, `https` unless overridden
    pub scheme: String,
    /// Hosts that may be contacted, compared case-insensitively
    pub allowed_hosts: Vec<String>,
}

impl UrlGuardConfig {
    pub fn new(allowed_hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            scheme: "https".to_string(),
            allowed_hosts: allowed_hosts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}

/// A validated destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub url: Url,
    /// Lower-cased host as written in the URL (no brackets for IPv6)
    pub host: String,
    /// Every address the host resolved to, all public
    pub addrs: Vec<SocketAddr>,
}

/// SSRF guard for upstream requests.
pub struct UrlGuard {
    scheme: String,
    allowed_hosts: Vec<String>,
    resolver: Arc<dyn HostResolver>,
}

impl UrlGuard {
    pub fn new(config: UrlGuardConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            scheme: config.scheme.to_ascii_lowercase(),
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|host| normalize_host(host))
                .collect(),
            resolver,
        }
    }

    /// Guard backed by system DNS.
    pub fn with_dns(config: UrlGuardConfig) -> Self {
        Self::new(config, Arc::new(DnsResolver))
    }

    /// Validate `raw` and resolve its host.
    ///
    /// # Errors
    ///
    /// - [`InsightsError::BlockedDestination`] for any policy violation
    /// - [`InsightsError::UpstreamUnreachable`] when the host does not resolve
    pub async fn check(&self, raw: &str) -> Result<ResolvedTarget, InsightsError> {
        let url = Url::parse(raw).map_err(|e| blocked(format!("unparsable URL: {e}")))?;

        if url.scheme() != self.scheme {
            return Err(blocked(format!(
                "scheme '{}' not allowed, expected '{}'",
                url.scheme(),
                self.scheme
            )));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(blocked("URL must not carry credentials".to_string()));
        }

        let (host, literal) = match url.host() {
            Some(Host::Domain(domain)) if domain.ends_with('.') => {
                return Err(blocked(format!("fully-qualified host '{domain}' not allowed")));
            }
            Some(Host::Domain(domain)) => (normalize_host(domain), None),
            Some(Host::Ipv4(ip)) => (ip.to_string(), Some(IpAddr::V4(ip))),
            Some(Host::Ipv6(ip)) => (ip.to_string(), Some(IpAddr::V6(ip))),
            None => return Err(blocked("URL has no host".to_string())),
        };

        if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            return Err(blocked(format!("host '{host}' is not allow-listed")));
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| blocked(format!("no port known for '{host}'")))?;

        let addrs = match literal {
            Some(ip) => vec![SocketAddr::new(ip, port)],
            None => self
                .resolver
                .resolve(&host, port)
                .await
                .map_err(|e| {
                    InsightsError::UpstreamUnreachable(format!("failed to resolve '{host}': {e}"))
                })?,
        };

        if addrs.is_empty() {
            return Err(InsightsError::UpstreamUnreachable(format!(
                "'{host}' resolved to no addresses"
            )));
        }

        if let Some(addr) = addrs.iter().find(|addr| !is_public_ip(addr.ip())) {
            warn!(
                "Blocked outbound request to {}: resolves to non-public address {}",
                host,
                addr.ip()
            );
            return Err(blocked(format!(
                "'{host}' resolves to non-public address {}",
                addr.ip()
            )));
        }

        Ok(ResolvedTarget { url, host, addrs })
    }
}

fn blocked(message: String) -> InsightsError {
    InsightsError::BlockedDestination(message)
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Whether `ip` is a globally routable unicast address.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    let this_network = a == 0;
    let shared = a == 100 && (b & 0xc0) == 64;
    let protocol_assignments = a == 192 && b == 0 && c == 0;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    let reserved = a >= 240;

    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || this_network
        || shared
        || protocol_assignments
        || benchmarking
        || reserved)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    let [s0, s1, s2, _, _, _, s6, s7] = segments;

    // Forms that embed an IPv4 address are judged by that address:
    // NAT64 64:ff9b::/96, IPv4-compatible ::/96 and 6to4 2002::/16.
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] || segments[..6] == [0; 6] {
        return is_public_v4(embedded_v4(s6, s7));
    }
    if s0 == 0x2002 {
        return is_public_v4(embedded_v4(s1, s2));
    }

    let unique_local = (s0 & 0xfe00) == 0xfc00;
    let link_local = (s0 & 0xffc0) == 0xfe80;
    let site_local = (s0 & 0xffc0) == 0xfec0;
    let discard = segments[..4] == [0x100, 0, 0, 0];
    let documentation = s0 == 0x2001 && s1 == 0x0db8;

    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || site_local
        || discard
        || documentation)
}

fn embedded_v4(hi: u16, lo: u16) -> Ipv4Addr {
    let [a, b] = hi.to_be_bytes();
    let [c, d] = lo.to_be_bytes();
    Ipv4Addr::new(a, b, c, d)
}
