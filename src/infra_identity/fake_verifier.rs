use crate::domain_model::UserId;
use crate::domain_port::*;

pub const FAKE_ASSERTION_PREFIX: &str = "fake-id-token:";

/// Accepts `fake-id-token:<uid>` and nothing else. Never wire this in release.
#[derive(Debug, Default)]
pub struct FakeIdentityVerifier;

impl FakeIdentityVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for FakeIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<UserId, IdentityError> {
        match assertion.strip_prefix(FAKE_ASSERTION_PREFIX) {
            Some(uid) if !uid.is_empty() => Ok(UserId::from(uid)),
            _ => Err(IdentityError::Rejected("not a fake id token".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_prefixed_assertion() {
        let uid = FakeIdentityVerifier::new()
            .verify("fake-id-token:u1")
            .await
            .unwrap();
        assert_eq!(uid, UserId::from("u1"));
    }

    #[tokio::test]
    async fn rejects_anything_else() {
        let verifier = FakeIdentityVerifier::new();
        for assertion in ["", "fake-id-token:", "u1", "FAKE-ID-TOKEN:u1"] {
            assert!(matches!(
                verifier.verify(assertion).await,
                Err(IdentityError::Rejected(_))
            ));
        }
    }
}
