use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;

/// Process-local store for development and tests. Records are never removed.
#[derive(Debug, Default)]
pub struct MemoryRefreshStore {
    records: DashMap<String, RefreshRecord>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn create(
        &self,
        owner: &UserId,
        ttl: Duration,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let expires_at = expiry_from_now(ttl)?;
        loop {
            let token = new_token_value();
            if let Entry::Vacant(slot) = self.records.entry(token.0.clone()) {
                let record = RefreshRecord {
                    id: new_record_id(),
                    owner_id: owner.clone(),
                    token,
                    expires_at,
                    revoked_at: None,
                };
                slot.insert(record.clone());
                return Ok(record);
            }
        }
    }

    async fn get_by_token(
        &self,
        token: &RefreshTokenValue,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        self.records
            .get(token.as_str())
            .map(|r| r.value().clone())
            .ok_or(RefreshStoreError::NotFound)
    }

    async fn revoke(&self, token: &RefreshTokenValue) -> Result<RevokeOutcome, RefreshStoreError> {
        // the shard write lock makes check-and-set atomic
        let mut record = self
            .records
            .get_mut(token.as_str())
            .ok_or(RefreshStoreError::NotFound)?;
        match record.revoked_at {
            Some(at) => Ok(RevokeOutcome::AlreadyRevoked(at)),
            None => {
                let now = Utc::now();
                record.revoked_at = Some(now);
                Ok(RevokeOutcome::Revoked(now))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    #[tokio::test]
    async fn create_returns_active_record() {
        let store = MemoryRefreshStore::new();
        let owner = UserId::from("u1");
        let rec = store.create(&owner, WEEK).await.unwrap();

        assert_eq!(rec.owner_id, owner);
        assert_eq!(rec.token.as_str().len(), RefreshTokenValue::LEN);
        assert!(rec.is_active_at(Utc::now()));

        let found = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(found.id, rec.id);
    }

    #[tokio::test]
    async fn token_values_are_unique() {
        let store = MemoryRefreshStore::new();
        let owner = UserId::from("u1");
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            let rec = store.create(&owner, WEEK).await.unwrap();
            assert!(seen.insert(rec.token.0));
        }
        assert_eq!(store.len(), 2000);
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_keeps_first_timestamp() {
        let store = MemoryRefreshStore::new();
        let rec = store.create(&UserId::from("u1"), WEEK).await.unwrap();

        let first = match store.revoke(&rec.token).await.unwrap() {
            RevokeOutcome::Revoked(at) => at,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            store.revoke(&rec.token).await.unwrap(),
            RevokeOutcome::AlreadyRevoked(first)
        );
        let stored = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(stored.revoked_at, Some(first));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let store = MemoryRefreshStore::new();
        let token = RefreshTokenValue("missing".to_string());
        assert!(matches!(
            store.get_by_token(&token).await,
            Err(RefreshStoreError::NotFound)
        ));
        assert!(matches!(
            store.revoke(&token).await,
            Err(RefreshStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn lookups_do_not_filter_expired_records() {
        let store = MemoryRefreshStore::new();
        let rec = store.create(&UserId::from("u1"), Duration::ZERO).await.unwrap();
        let found = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(found.state_at(Utc::now()), RefreshState::Expired);
    }

    #[tokio::test]
    async fn concurrent_revokes_have_one_winner() {
        let store = Arc::new(MemoryRefreshStore::new());
        let rec = store.create(&UserId::from("u1"), WEEK).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let token = rec.token.clone();
            handles.push(tokio::spawn(async move { store.revoke(&token).await }));
        }
        let mut winners = 0;
        for handle in handles {
            if let RevokeOutcome::Revoked(_) = handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
