use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{IdpId, Principal};

/// Identity claims model (transport-agnostic).
///
/// This is the minimal set of claims expected once a token has been decoded and
/// its signature verified by whatever security layer is in use. Timestamps are
/// unix seconds, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (identity-provider id).
    pub sub: IdpId,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

impl IdentityClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Authentication failures. These are distinct from access denials: the caller
/// could not be identified at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature or format rejected: {0}")]
    Rejected(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token is missing required claim '{0}'")]
    MissingClaim(&'static str),
}

/// Deterministically validate identity claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding is
/// done by an [`IdentityVerifier`].
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), AuthenticationError> {
    if claims.sub.as_str().trim().is_empty() {
        return Err(AuthenticationError::MissingClaim("sub"));
    }
    if claims.email.trim().is_empty() {
        return Err(AuthenticationError::MissingClaim("email"));
    }
    let issued_at = claims
        .issued_at()
        .ok_or(AuthenticationError::InvalidTimeWindow)?;
    let expires_at = claims
        .expires_at()
        .ok_or(AuthenticationError::InvalidTimeWindow)?;

    if expires_at <= issued_at {
        return Err(AuthenticationError::InvalidTimeWindow);
    }
    if now < issued_at {
        return Err(AuthenticationError::NotYetValid);
    }
    if now >= expires_at {
        return Err(AuthenticationError::Expired);
    }
    Ok(())
}

/// Turns a raw bearer token into a verified [`Principal`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthenticationError>;
}
