use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_identity::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// Everything the HTTP layer needs, wired once at startup and read-only afterwards.
pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub credential_signer: Arc<dyn CredentialSigner>,
    pub cookie_policy: CookiePolicy,
    pool: Option<Pool<MySql>>,
}

/// Attributes shared by every refresh cookie the gateway emits.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub max_age: Duration,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let credential_signer: Arc<dyn CredentialSigner> =
            Arc::new(JwtHs256Signer::new(JwtConfig {
                signing_key: settings.auth.signing_key.clone().into_bytes(),
            }));

        let identity_timeout = Duration::from_millis(settings.identity.timeout_ms);
        let identity_verifier: Arc<dyn IdentityVerifier> =
            match settings.identity.backend.as_str() {
                "fake" => {
                    warn!("fake identity backend enabled, do not use in production");
                    Arc::new(FakeIdentityVerifier::new())
                }
                "firebase" => {
                    let project_id = settings
                        .identity
                        .project_id
                        .clone()
                        .ok_or_else(|| anyhow::anyhow!("identity.project_id is required"))?;
                    let jwks_uri = settings
                        .identity
                        .jwks_uri
                        .clone()
                        .unwrap_or_else(|| FIREBASE_JWKS_URI.to_string());
                    Arc::new(FirebaseIdentityVerifier::try_new(FirebaseConfig {
                        project_id,
                        jwks_uri,
                        fetch_timeout: identity_timeout,
                        min_refetch_interval: DEFAULT_JWKS_REFETCH_INTERVAL,
                    })?)
                }
                other => return Err(anyhow::anyhow!("Unknown identity backend: {}", other)),
            };

        let mut pool = None;
        let refresh_store: Arc<dyn RefreshStore> = match settings.store.backend.as_str() {
            "memory" => {
                warn!("in-memory refresh store enabled, sessions are lost on restart");
                Arc::new(MemoryRefreshStore::new())
            }
            "mysql" => {
                let dsn = Self::dsn(settings)?;
                let mysql = Pool::<MySql>::connect(dsn).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlRefreshStore::new(mysql))
            }
            "redis" => {
                let client = redis::Client::open(Self::dsn(settings)?)?;
                let manager = client.get_connection_manager().await?;
                Arc::new(RedisRefreshStore::new(manager, settings.store.prefix.clone()))
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            identity_verifier,
            credential_signer.clone(),
            refresh_store,
            SessionConfig {
                access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
                refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
                store_timeout: Duration::from_millis(settings.store.timeout_ms),
                identity_timeout,
            },
        ));

        info!(
            identity = %settings.identity.backend,
            store = %settings.store.backend,
            "server started"
        );

        Ok(Self {
            session_service,
            credential_signer,
            cookie_policy: CookiePolicy {
                secure: settings.http.cookie_secure(),
                max_age: Duration::from_secs(settings.auth.refresh_ttl_secs),
            },
            pool,
        })
    }

    /// Assemble a server from ready-made parts; used by tests and embedders.
    pub fn from_parts(
        session_service: Arc<dyn SessionService>,
        credential_signer: Arc<dyn CredentialSigner>,
        cookie_policy: CookiePolicy,
    ) -> Self {
        Self {
            session_service,
            credential_signer,
            cookie_policy,
            pool: None,
        }
    }

    fn dsn(settings: &Settings) -> anyhow::Result<&str> {
        settings
            .store
            .dsn
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.dsn is required"))
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
