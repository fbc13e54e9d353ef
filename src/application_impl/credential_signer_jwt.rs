use crate::application_port::*;
use crate::domain_model::*;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::time::Duration;

#[derive(Clone)]
pub struct JwtConfig {
    pub signing_key: Vec<u8>,
}

/// HS256 access tokens carrying `sub`, `iat` and `exp`.
pub struct JwtHs256Signer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtHs256Signer {
    pub fn new(cfg: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked by hand below: no leeway and `exp == now` is already expired
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        JwtHs256Signer {
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            validation,
        }
    }
}

impl CredentialSigner for JwtHs256Signer {
    fn issue(
        &self,
        subject: &UserId,
        ttl: Duration,
    ) -> Result<(AccessToken, AccessClaims), SignerError> {
        let ttl_secs =
            i64::try_from(ttl.as_secs()).map_err(|e| SignerError::InternalError(e.to_string()))?;
        let iat = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: subject.clone(),
            iat,
            exp: iat
                .checked_add(ttl_secs)
                .ok_or_else(|| SignerError::InternalError("access ttl out of range".to_string()))?,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SignerError::InternalError(e.to_string()))?;
        Ok((AccessToken(token), claims))
    }

    fn verify(&self, token: &str) -> Result<AccessClaims, SignerError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => SignerError::BadSignature,
                ErrorKind::ExpiredSignature => SignerError::Expired,
                _ => SignerError::Malformed,
            },
        )?;
        let claims = data.claims;
        if claims.sub.as_str().is_empty() {
            return Err(SignerError::Malformed);
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(SignerError::Expired);
        }
        Ok(claims)
    }
}
