use crate::domain_model::*;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("token malformed")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Stateless access-token codec. No I/O, so the trait is synchronous.
pub trait CredentialSigner: Send + Sync {
    fn issue(&self, subject: &UserId, ttl: Duration) -> Result<(AccessToken, AccessClaims), SignerError>;
    fn verify(&self, token: &str) -> Result<AccessClaims, SignerError>;
}
