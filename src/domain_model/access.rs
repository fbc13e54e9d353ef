use crate::domain_model::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Claim set carried by an access token. Timestamps are unix seconds.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// Identity attached to a request once its bearer token has been verified.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub expires_at: i64,
}

impl From<AccessClaims> for AuthenticatedUser {
    fn from(claims: AccessClaims) -> Self {
        AuthenticatedUser {
            user_id: claims.sub,
            expires_at: claims.exp,
        }
    }
}
