use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct RefreshRecordId(pub uuid::Uuid);

impl fmt::Display for RefreshRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque bearer secret handed to the client in the refresh cookie.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct RefreshTokenValue(pub String);

impl RefreshTokenValue {
    pub const LEN: usize = 43;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the secret out of logs.
impl fmt::Debug for RefreshTokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "RefreshTokenValue({}…)", prefix)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshState {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub id: RefreshRecordId,
    pub owner_id: UserId,
    pub token: RefreshTokenValue,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshRecord {
    /// Rotated and explicitly revoked records are indistinguishable here;
    /// revocation wins over expiry.
    pub fn state_at(&self, now: DateTime<Utc>) -> RefreshState {
        if self.revoked_at.is_some() {
            RefreshState::Revoked
        } else if self.expires_at <= now {
            RefreshState::Expired
        } else {
            RefreshState::Active
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == RefreshState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_in: Duration, revoked: bool) -> RefreshRecord {
        let now = Utc::now();
        RefreshRecord {
            id: RefreshRecordId(uuid::Uuid::new_v4()),
            owner_id: UserId::from("u1"),
            token: RefreshTokenValue("t".repeat(RefreshTokenValue::LEN)),
            expires_at: now + expires_in,
            revoked_at: revoked.then_some(now),
        }
    }

    #[test]
    fn active_until_expiry_instant() {
        let rec = record(Duration::seconds(10), false);
        assert_eq!(rec.state_at(Utc::now()), RefreshState::Active);
        assert_eq!(rec.state_at(rec.expires_at), RefreshState::Expired);
    }

    #[test]
    fn revocation_takes_precedence_over_expiry() {
        let rec = record(Duration::seconds(-10), true);
        assert_eq!(rec.state_at(Utc::now()), RefreshState::Revoked);
        assert!(!rec.is_active_at(Utc::now()));
    }

    #[test]
    fn debug_output_does_not_leak_the_secret() {
        let token = RefreshTokenValue("abcdefghijklmnop".to_string());
        let printed = format!("{:?}", token);
        assert!(printed.starts_with("RefreshTokenValue(abcdef"));
        assert!(!printed.contains("ghijklmnop"));
    }
}
