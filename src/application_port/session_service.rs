use crate::application_port::SignerError;
use crate::domain_model::*;
use crate::domain_port::{IdentityError, RefreshStoreError};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why a credential was refused. Used for logging and branching only; it is
/// never shown to the client.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Rejection {
    NotFound,
    Revoked,
    Expired,
    Malformed,
    BadSignature,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::NotFound => "not found",
            Rejection::Revoked => "revoked",
            Rejection::Expired => "expired",
            Rejection::Malformed => "malformed",
            Rejection::BadSignature => "bad signature",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("identity assertion rejected")]
    InvalidAssertion,
    #[error("unauthorized ({0})")]
    Unauthorized(Rejection),
    #[error("rotation aborted after the presented token was revoked: {0}")]
    RotationAborted(String),
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<SignerError> for SessionError {
    fn from(error: SignerError) -> Self {
        match error {
            SignerError::Malformed => SessionError::Unauthorized(Rejection::Malformed),
            SignerError::BadSignature => SessionError::Unauthorized(Rejection::BadSignature),
            SignerError::Expired => SessionError::Unauthorized(Rejection::Expired),
            SignerError::InternalError(e) => SessionError::InternalError(e),
        }
    }
}

impl From<RefreshStoreError> for SessionError {
    fn from(error: RefreshStoreError) -> Self {
        match error {
            RefreshStoreError::NotFound => SessionError::Unauthorized(Rejection::NotFound),
            RefreshStoreError::Store(e) => SessionError::Unavailable(e),
        }
    }
}

impl From<IdentityError> for SessionError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::Rejected(_) => SessionError::InvalidAssertion,
            IdentityError::Unavailable(e) => SessionError::Unavailable(e),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: UserId,
    pub access_token: AccessToken,
    pub access_claims: AccessClaims,
    pub refresh: RefreshRecord,
}

impl IssuedSession {
    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        self.refresh.expires_at
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Trade an identity assertion for a first access/refresh pair.
    async fn exchange(&self, assertion: &str) -> Result<IssuedSession, SessionError>;

    /// Consume `token` and mint its replacement.
    async fn refresh(&self, token: &RefreshTokenValue) -> Result<IssuedSession, SessionError>;

    /// Best-effort revoke. Never fails from the caller's point of view.
    async fn logout(&self, token: &RefreshTokenValue);
}
