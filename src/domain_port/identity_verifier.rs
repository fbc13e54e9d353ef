use crate::domain_model::UserId;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity assertion rejected: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// External identity provider that turns a one-time assertion into a subject.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<UserId, IdentityError>;
}
