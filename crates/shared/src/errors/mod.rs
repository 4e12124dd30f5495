//! Error taxonomy shared by both tiers.
//!
//! This module provides:
//! - [`InsightsError`]: every failure a request can end in, with its detail
//! - [`ErrorKind`]: the closed set of kinds, each with a stable code and HTTP status
//! - [`RetryClass`]: whether the upstream client may retry an error

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can end a gateway or fetcher request.
///
/// Each variant maps to exactly one [`ErrorKind`] via [`kind`](Self::kind), which
/// carries the client-visible code and status. Variant payloads are for logs;
/// responses render [`ErrorKind::public_message`] for server-side kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsightsError {
    /// The Authorization header is absent or not `Bearer <token>`.
    #[error("Missing or malformed Authorization header")]
    MissingCredential,

    /// A bearer token was presented but does not match the configured secret.
    #[error("Invalid authentication token")]
    InvalidCredential,

    /// The caller used up its quota for the current window.
    #[error("Rate limit exceeded: maximum {limit} requests per window")]
    RateLimitExceeded {
        /// Configured quota per window
        limit: u64,
        /// Time until the current window closes
        reset_after: Duration,
    },

    /// The symbol is empty, contains disallowed characters or is not allow-listed.
    #[error("Invalid symbol '{symbol}'. Allowed symbols: {allowed}")]
    InvalidSymbol {
        /// The raw symbol as received
        symbol: String,
        /// Comma separated list of accepted symbols
        allowed: String,
    },

    /// The outbound URL failed SSRF validation.
    #[error("Blocked destination: {0}")]
    BlockedDestination(String),

    /// Upstream answered 400 (or another non-retryable client error).
    #[error("Upstream rejected the request: {0}")]
    UpstreamBadRequest(String),

    /// Upstream answered 401/403, usually a bad API key.
    #[error("Upstream authentication failed: {0}")]
    UpstreamUnauthorized(String),

    /// Upstream answered 404.
    #[error("Upstream resource not found: {0}")]
    UpstreamNotFound(String),

    /// Upstream answered 429 and the retry budget ran out.
    #[error("Upstream rate limited the request")]
    UpstreamRateLimited {
        /// `Retry-After` hint from the last response, if any
        retry_after: Option<Duration>,
    },

    /// Upstream answered 5xx.
    #[error("Upstream server error: {0}")]
    UpstreamServerError(String),

    /// The upstream request timed out.
    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    /// The upstream host could not be resolved or connected to.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream answered 2xx with a body that does not have the expected shape.
    #[error("Malformed upstream response: {0}")]
    UpstreamMalformedResponse(String),

    /// The gateway gave up waiting for the fetcher.
    #[error("Timed out waiting for the fetcher service")]
    GatewayTimeout,

    /// The cache or rate-limit backing store could not be reached.
    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    /// No cached insight exists for the requested id.
    #[error("No cached insight found for request id '{0}'")]
    InsightNotFound(String),
}

/// Closed set of error kinds with stable client-visible codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingCredential,
    InvalidCredential,
    RateLimitExceeded,
    InvalidSymbol,
    BlockedDestination,
    UpstreamBadRequest,
    UpstreamUnauthorized,
    UpstreamNotFound,
    UpstreamRateLimited,
    UpstreamServerError,
    UpstreamTimeout,
    UpstreamUnreachable,
    UpstreamMalformedResponse,
    GatewayTimeout,
    StoreUnavailable,
    InsightNotFound,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 16] = [
        Self::MissingCredential,
        Self::InvalidCredential,
        Self::RateLimitExceeded,
        Self::InvalidSymbol,
        Self::BlockedDestination,
        Self::UpstreamBadRequest,
        Self::UpstreamUnauthorized,
        Self::UpstreamNotFound,
        Self::UpstreamRateLimited,
        Self::UpstreamServerError,
        Self::UpstreamTimeout,
        Self::UpstreamUnreachable,
        Self::UpstreamMalformedResponse,
        Self::GatewayTimeout,
        Self::StoreUnavailable,
        Self::InsightNotFound,
    ];

    /// Stable code rendered in error bodies.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::InvalidSymbol => "INVALID_SYMBOL",
            Self::BlockedDestination => "BLOCKED_DESTINATION",
            Self::UpstreamBadRequest => "UPSTREAM_BAD_REQUEST",
            Self::UpstreamUnauthorized => "UPSTREAM_UNAUTHORIZED",
            Self::UpstreamNotFound => "UPSTREAM_NOT_FOUND",
            Self::UpstreamRateLimited => "UPSTREAM_RATE_LIMITED",
            Self::UpstreamServerError => "UPSTREAM_SERVER_ERROR",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
            Self::UpstreamMalformedResponse => "UPSTREAM_MALFORMED_RESPONSE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::InsightNotFound => "INSIGHT_NOT_FOUND",
        }
    }

    /// Parse a code produced by [`code`](Self::code).
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Client-facing HTTP status.
    pub fn status(self) -> u16 {
        match self {
            Self::MissingCredential | Self::InvalidCredential => 401,
            Self::RateLimitExceeded => 429,
            Self::InvalidSymbol => 400,
            Self::InsightNotFound => 404,
            Self::StoreUnavailable => 503,
            Self::UpstreamTimeout | Self::GatewayTimeout => 504,
            Self::BlockedDestination
            | Self::UpstreamBadRequest
            | Self::UpstreamUnauthorized
            | Self::UpstreamNotFound
            | Self::UpstreamRateLimited
            | Self::UpstreamServerError
            | Self::UpstreamUnreachable
            | Self::UpstreamMalformedResponse => 502,
        }
    }

    /// Generic message for kinds whose detail must stay in the logs.
    pub fn public_message(self) -> &'static str {
        match self {
            Self::BlockedDestination => "Upstream destination rejected by policy",
            Self::UpstreamBadRequest => "Upstream API rejected the request",
            Self::UpstreamUnauthorized => "Upstream API authentication failed",
            Self::UpstreamNotFound => "Requested data not found upstream",
            Self::UpstreamRateLimited => "Upstream API is rate limiting requests",
            Self::UpstreamServerError => "Upstream API unavailable",
            Self::UpstreamTimeout => "Upstream API timed out",
            Self::UpstreamUnreachable => "Failed to connect to upstream API",
            Self::UpstreamMalformedResponse => "Failed to parse upstream API response",
            Self::GatewayTimeout => "Fetcher service request timed out",
            Self::StoreUnavailable => "Service temporarily unavailable",
            Self::MissingCredential => "Missing or malformed Authorization header",
            Self::InvalidCredential => "Invalid authentication token",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::InvalidSymbol => "Invalid symbol",
            Self::InsightNotFound => "No cached insight found",
        }
    }

    /// Whether the error detail may be shown to the caller.
    ///
    /// Caller-side kinds describe the caller's own input; everything else is
    /// rendered with [`public_message`](Self::public_message).
    pub fn exposes_detail(self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::InvalidCredential
                | Self::RateLimitExceeded
                | Self::InvalidSymbol
                | Self::InsightNotFound
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl InsightsError {
    /// The kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::InvalidCredential => ErrorKind::InvalidCredential,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::InvalidSymbol { .. } => ErrorKind::InvalidSymbol,
            Self::BlockedDestination(_) => ErrorKind::BlockedDestination,
            Self::UpstreamBadRequest(_) => ErrorKind::UpstreamBadRequest,
            Self::UpstreamUnauthorized(_) => ErrorKind::UpstreamUnauthorized,
            Self::UpstreamNotFound(_) => ErrorKind::UpstreamNotFound,
            Self::UpstreamRateLimited { .. } => ErrorKind::UpstreamRateLimited,
            Self::UpstreamServerError(_) => ErrorKind::UpstreamServerError,
            Self::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            Self::UpstreamUnreachable(_) => ErrorKind::UpstreamUnreachable,
            Self::UpstreamMalformedResponse(_) => ErrorKind::UpstreamMalformedResponse,
            Self::GatewayTimeout => ErrorKind::GatewayTimeout,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::InsightNotFound(_) => ErrorKind::InsightNotFound,
        }
    }

    /// Rebuild an error from a kind and a message received over the wire.
    ///
    /// Used by the gateway to recover the fetcher's error kind from its JSON body.
    /// Structured payloads that do not travel over the wire get neutral values.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::MissingCredential => Self::MissingCredential,
            ErrorKind::InvalidCredential => Self::InvalidCredential,
            ErrorKind::RateLimitExceeded => Self::RateLimitExceeded {
                limit: 0,
                reset_after: Duration::ZERO,
            },
            ErrorKind::InvalidSymbol => Self::InvalidSymbol {
                symbol: message,
                allowed: crate::symbols::allowed_list(),
            },
            ErrorKind::BlockedDestination => Self::BlockedDestination(message),
            ErrorKind::UpstreamBadRequest => Self::UpstreamBadRequest(message),
            ErrorKind::UpstreamUnauthorized => Self::UpstreamUnauthorized(message),
            ErrorKind::UpstreamNotFound => Self::UpstreamNotFound(message),
            ErrorKind::UpstreamRateLimited => Self::UpstreamRateLimited { retry_after: None },
            ErrorKind::UpstreamServerError => Self::UpstreamServerError(message),
            ErrorKind::UpstreamTimeout => Self::UpstreamTimeout(message),
            ErrorKind::UpstreamUnreachable => Self::UpstreamUnreachable(message),
            ErrorKind::UpstreamMalformedResponse => Self::UpstreamMalformedResponse(message),
            ErrorKind::GatewayTimeout => Self::GatewayTimeout,
            ErrorKind::StoreUnavailable => Self::StoreUnavailable(message),
            ErrorKind::InsightNotFound => Self::InsightNotFound(message),
        }
    }

    /// Message safe to render in a response body.
    pub fn client_message(&self) -> String {
        let kind = self.kind();
        if kind.exposes_detail() {
            self.to_string()
        } else {
            kind.public_message().to_string()
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// Only the upstream client consults this; every guard failure is
    /// [`RetryClass::Never`].
    ///
    /// # Examples
    ///
    /// ```
    /// use insights_shared::errors::{InsightsError, RetryClass};
    ///
    /// let error = InsightsError::UpstreamTimeout("10s elapsed".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = InsightsError::UpstreamNotFound("bitcoin".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::UpstreamServerError(_)
            | Self::UpstreamTimeout(_)
            | Self::UpstreamUnreachable(_)
            | Self::UpstreamRateLimited { .. } => RetryClass::WithBackoff,

            Self::MissingCredential
            | Self::InvalidCredential
            | Self::RateLimitExceeded { .. }
            | Self::InvalidSymbol { .. }
            | Self::BlockedDestination(_)
            | Self::UpstreamBadRequest(_)
            | Self::UpstreamUnauthorized(_)
            | Self::UpstreamNotFound(_)
            | Self::UpstreamMalformedResponse(_)
            | Self::GatewayTimeout
            | Self::StoreUnavailable(_)
            | Self::InsightNotFound(_) => RetryClass::Never,
        }
    }

    /// Backoff hint carried by the error (upstream `Retry-After`).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::UpstreamRateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
