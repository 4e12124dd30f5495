//! Bearer credential validation.

use insights_shared::{Identity, InsightsError};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex characters of the token digest used as the caller identity.
const IDENTITY_LEN: usize = 16;

/// Validates `Authorization: Bearer <token>` against the configured secret.
///
/// Only the SHA-256 digest of the secret is kept. Comparison runs over
/// fixed-length digests in constant time.
pub struct AuthGuard {
    expected: [u8; 32],
}

impl AuthGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            expected: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Check the header and derive the caller's identity.
    ///
    /// # Errors
    ///
    /// - [`InsightsError::MissingCredential`] when the header is absent or not
    ///   a well-formed bearer credential
    /// - [`InsightsError::InvalidCredential`] when the token does not match
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, InsightsError> {
        let token = parse_bearer(authorization).ok_or(InsightsError::MissingCredential)?;

        let presented: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if !bool::from(presented.as_slice().ct_eq(self.expected.as_slice())) {
            return Err(InsightsError::InvalidCredential);
        }

        Ok(identity_from_digest(&presented))
    }
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard").finish_non_exhaustive()
    }
}

/// Extract the token from `Bearer <token>`.
///
/// The scheme is case-insensitive; exactly one non-empty token must follow.
pub fn parse_bearer(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// Identity for a raw token: leading hex characters of its SHA-256.
pub fn identity_for(token: &str) -> Identity {
    identity_from_digest(&Sha256::digest(token.as_bytes()).into())
}

fn identity_from_digest(digest: &[u8; 32]) -> Identity {
    let mut id = hex::encode(digest);
    id.truncate(IDENTITY_LEN);
    Identity::new(id)
}
