use crate::domain_model::*;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RefreshStoreError {
    #[error("refresh token not found")]
    NotFound,
    #[error("store error: {0}")]
    Store(String),
}

/// Result of a conditional revoke. Only `Revoked` means this call moved the
/// record out of the active state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RevokeOutcome {
    Revoked(DateTime<Utc>),
    AlreadyRevoked(DateTime<Utc>),
}

#[async_trait::async_trait]
pub trait RefreshStore: Send + Sync {
    /// Persist a new active record for `owner` with a freshly generated token value.
    async fn create(
        &self,
        owner: &UserId,
        ttl: Duration,
    ) -> Result<RefreshRecord, RefreshStoreError>;

    /// Point lookup. Revoked and expired records are returned as-is.
    async fn get_by_token(
        &self,
        token: &RefreshTokenValue,
    ) -> Result<RefreshRecord, RefreshStoreError>;

    /// Set `revoked_at` to the store's current time unless it is already set.
    async fn revoke(&self, token: &RefreshTokenValue) -> Result<RevokeOutcome, RefreshStoreError>;
}

pub fn new_token_value() -> RefreshTokenValue {
    let len = RefreshTokenValue::LEN;
    RefreshTokenValue(nanoid::nanoid!(len))
}

pub fn new_record_id() -> RefreshRecordId {
    RefreshRecordId(uuid::Uuid::new_v4())
}

pub fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>, RefreshStoreError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| RefreshStoreError::Store(e.to_string()))?;
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| RefreshStoreError::Store("refresh ttl out of range".to_string()))
}

/// Storage key for a token value. Persistent backends index on this instead
/// of the bearer secret itself.
pub fn token_digest(token: &RefreshTokenValue) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(token.as_str().as_bytes());
    hex::encode(digest.as_slice())
}
