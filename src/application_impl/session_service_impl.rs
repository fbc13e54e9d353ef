use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_timeout: Duration,
    pub identity_timeout: Duration,
}

/// Drives the refresh-token state machine.
///
/// A record is `Active`, `Revoked` (rotated or logged out) or `Expired`; the
/// last two are terminal. Rotation revokes the presented record before minting
/// its replacement, so a failure in between leaves the client logged out
/// rather than holding a reusable token.
pub struct RealSessionService {
    identity_verifier: Arc<dyn IdentityVerifier>,
    credential_signer: Arc<dyn CredentialSigner>,
    refresh_store: Arc<dyn RefreshStore>,
    cfg: SessionConfig,
}

impl RealSessionService {
    pub fn new(
        identity_verifier: Arc<dyn IdentityVerifier>,
        credential_signer: Arc<dyn CredentialSigner>,
        refresh_store: Arc<dyn RefreshStore>,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            identity_verifier,
            credential_signer,
            refresh_store,
            cfg,
        }
    }

    async fn with_store<T>(
        &self,
        call: impl Future<Output = Result<T, RefreshStoreError>>,
    ) -> Result<T, SessionError> {
        bounded(self.cfg.store_timeout, "refresh store", call).await
    }
}

async fn bounded<T, E>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, SessionError>
where
    SessionError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::Unavailable(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn exchange(&self, assertion: &str) -> Result<IssuedSession, SessionError> {
        let user_id = bounded(
            self.cfg.identity_timeout,
            "identity verifier",
            self.identity_verifier.verify(assertion),
        )
        .await?;

        let (access_token, access_claims) = self
            .credential_signer
            .issue(&user_id, self.cfg.access_ttl)?;

        let refresh = self
            .with_store(self.refresh_store.create(&user_id, self.cfg.refresh_ttl))
            .await?;

        info!(target: "audit", user_id = %user_id, record_id = %refresh.id, "session issued");

        Ok(IssuedSession {
            user_id,
            access_token,
            access_claims,
            refresh,
        })
    }

    async fn refresh(&self, token: &RefreshTokenValue) -> Result<IssuedSession, SessionError> {
        let record = self.with_store(self.refresh_store.get_by_token(token)).await?;

        match record.state_at(Utc::now()) {
            RefreshState::Active => {}
            RefreshState::Revoked => {
                // Either a retry after a successful rotation or a replayed stolen token.
                // Records carry no lineage, so the owner's successor token stays valid.
                warn!(
                    target: "audit",
                    user_id = %record.owner_id,
                    record_id = %record.id,
                    "revoked refresh token presented"
                );
                return Err(SessionError::Unauthorized(Rejection::Revoked));
            }
            RefreshState::Expired => {
                return Err(SessionError::Unauthorized(Rejection::Expired));
            }
        }

        match self.with_store(self.refresh_store.revoke(token)).await? {
            RevokeOutcome::Revoked(_) => {}
            RevokeOutcome::AlreadyRevoked(_) => {
                warn!(
                    target: "audit",
                    user_id = %record.owner_id,
                    record_id = %record.id,
                    "concurrent rotation lost the race"
                );
                return Err(SessionError::Unauthorized(Rejection::Revoked));
            }
        }

        // From here on the presented token is consumed; never hand it back as retryable.
        let refresh = self
            .with_store(
                self.refresh_store
                    .create(&record.owner_id, self.cfg.refresh_ttl),
            )
            .await
            .map_err(|e| abort_rotation(&record, e))?;

        let (access_token, access_claims) = self
            .credential_signer
            .issue(&record.owner_id, self.cfg.access_ttl)
            .map_err(|e| abort_rotation(&record, SessionError::from(e)))?;

        info!(
            target: "audit",
            user_id = %record.owner_id,
            revoked = %record.id,
            issued = %refresh.id,
            "refresh token rotated"
        );

        Ok(IssuedSession {
            user_id: record.owner_id,
            access_token,
            access_claims,
            refresh,
        })
    }

    async fn logout(&self, token: &RefreshTokenValue) {
        match self.with_store(self.refresh_store.revoke(token)).await {
            Ok(RevokeOutcome::Revoked(at)) => {
                info!(target: "audit", revoked_at = %at, "refresh token revoked on logout");
            }
            Ok(RevokeOutcome::AlreadyRevoked(_)) => {
                debug!("logout with an already revoked refresh token");
            }
            Err(SessionError::Unauthorized(_)) => {
                debug!("logout with an unknown refresh token");
            }
            Err(e) => {
                warn!(target: "audit", error = %e, "logout revoke failed, client credential cleared anyway");
            }
        }
    }
}

fn abort_rotation(record: &RefreshRecord, error: SessionError) -> SessionError {
    error!(
        target: "audit",
        user_id = %record.owner_id,
        record_id = %record.id,
        error = %error,
        "rotation aborted after revoke, client must re-authenticate"
    );
    SessionError::RotationAborted(error.to_string())
}
