use crate::domain_model::UserId;
use crate::domain_port::*;
use crate::logger::*;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

pub const FIREBASE_JWKS_URI: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

pub const DEFAULT_JWKS_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub jwks_uri: String,
    pub fetch_timeout: Duration,
    /// Unknown `kid`s within this window of the last fetch are rejected without refetching.
    pub min_refetch_interval: Duration,
}

impl FirebaseConfig {
    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseIdClaims {
    sub: String,
}

/// Verifies Firebase ID tokens (RS256) against the provider's published keys.
/// Keys are cached by `kid` and refetched when an unknown `kid` shows up, at
/// most once per `min_refetch_interval`.
pub struct FirebaseIdentityVerifier {
    cfg: FirebaseConfig,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
    last_fetch: Mutex<Option<Instant>>,
}

impl FirebaseIdentityVerifier {
    pub fn try_new(cfg: FirebaseConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.fetch_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(FirebaseIdentityVerifier {
            cfg,
            http,
            keys: RwLock::new(HashMap::new()),
            last_fetch: Mutex::new(None),
        })
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::RS256);
        v.set_issuer(&[self.cfg.issuer()]);
        v.set_audience(&[self.cfg.project_id.clone()]);
        v.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        v
    }

    async fn cached(&self, kid: &str) -> Option<Jwk> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn key(&self, kid: &str) -> Result<Jwk, IdentityError> {
        if let Some(jwk) = self.cached(kid).await {
            return Ok(jwk);
        }

        {
            // one fetch at a time; waiters see the keys it brought in
            let mut last_fetch = self.last_fetch.lock().await;
            if let Some(jwk) = self.cached(kid).await {
                return Ok(jwk);
            }
            let throttled = last_fetch
                .is_some_and(|at| at.elapsed() < self.cfg.min_refetch_interval);
            if throttled {
                debug!(kid, "unknown signing key, refetch throttled");
            } else {
                *last_fetch = Some(Instant::now());
                self.refresh_keys().await?;
            }
        }

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected(format!("unknown signing key {}", kid)))
    }

    async fn refresh_keys(&self) -> Result<(), IdentityError> {
        debug!(uri = %self.cfg.jwks_uri, "fetching identity provider keys");
        let response = self
            .http
            .get(&self.cfg.jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "key endpoint returned {}",
                response.status()
            )));
        }
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let fresh: HashMap<String, Jwk> = set
            .keys
            .into_iter()
            .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
            .collect();
        info!(count = fresh.len(), "identity provider keys refreshed");
        *self.keys.write().await = fresh;
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for FirebaseIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<UserId, IdentityError> {
        let header =
            decode_header(assertion).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Rejected(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Rejected("missing kid".to_string()))?;

        let jwk = self.key(&kid).await?;
        let key =
            DecodingKey::from_jwk(&jwk).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        let data = decode::<FirebaseIdClaims>(assertion, &key, &self.validation())
            .map_err(|e| IdentityError::Rejected(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(IdentityError::Rejected("empty subject".to_string()));
        }
        Ok(UserId(data.claims.sub))
    }
}
