use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;

const REFRESH_CREATE: &str = include_str!("refresh_create.lua");
const REFRESH_REVOKE: &str = include_str!("refresh_revoke.lua");

const MAX_INSERT_ATTEMPTS: usize = 3;

/// One hash per token digest. Keys carry no TTL so dead tokens stay detectable.
pub struct RedisRefreshStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRefreshStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRefreshStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, token: &RefreshTokenValue) -> String {
        format!("{}:{}", self.prefix, token_digest(token))
    }
}

fn millis_to_datetime(raw: &str) -> Result<DateTime<Utc>, RefreshStoreError> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| RefreshStoreError::Store(format!("bad timestamp {:?}", raw)))
}

fn record_from_fields(
    fields: &HashMap<String, String>,
    token: &RefreshTokenValue,
) -> Result<RefreshRecord, RefreshStoreError> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| RefreshStoreError::Store(format!("record missing field {}", name)))
    };

    let id = field("id")?
        .parse::<uuid::Uuid>()
        .map(RefreshRecordId)
        .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
    let owner_id = UserId(field("user_id")?.clone());
    let expires_at = millis_to_datetime(field("expires_at")?)?;
    let revoked_at = fields
        .get("revoked_at")
        .map(|raw| millis_to_datetime(raw))
        .transpose()?;

    Ok(RefreshRecord {
        id,
        owner_id,
        token: token.clone(),
        expires_at,
        revoked_at,
    })
}

#[async_trait::async_trait]
impl RefreshStore for RedisRefreshStore {
    async fn create(
        &self,
        owner: &UserId,
        ttl: Duration,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let expires_at = expiry_from_now(ttl)?;
        let mut conn = self.conn.clone();
        let script = Script::new(REFRESH_CREATE);

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let id = new_record_id();
            let token = new_token_value();
            let created: i64 = script
                .key(self.key(&token))
                .arg(id.to_string())
                .arg(owner.as_str())
                .arg(expires_at.timestamp_millis())
                .invoke_async(&mut conn)
                .await
                .map_err(|e| RefreshStoreError::Store(e.to_string()))?;

            if created == 1 {
                return Ok(RefreshRecord {
                    id,
                    owner_id: owner.clone(),
                    token,
                    expires_at,
                    revoked_at: None,
                });
            }
        }

        Err(RefreshStoreError::Store(
            "could not allocate a unique refresh token".to_string(),
        ))
    }

    async fn get_by_token(
        &self,
        token: &RefreshTokenValue,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.key(token))
            .await
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        if fields.is_empty() {
            return Err(RefreshStoreError::NotFound);
        }
        record_from_fields(&fields, token)
    }

    async fn revoke(&self, token: &RefreshTokenValue) -> Result<RevokeOutcome, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let (status, at): (i64, String) = Script::new(REFRESH_REVOKE)
            .key(self.key(token))
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;

        match status {
            1 => Ok(RevokeOutcome::Revoked(millis_to_datetime(&at)?)),
            0 => Ok(RevokeOutcome::AlreadyRevoked(millis_to_datetime(&at)?)),
            -1 => Err(RefreshStoreError::NotFound),
            other => Err(RefreshStoreError::Store(format!(
                "unknown script status {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Needs `TURNSTILE_TEST_REDIS_DSN`; skipped otherwise. Each call gets its own key prefix.
    async fn store() -> Option<RedisRefreshStore> {
        let dsn = std::env::var("TURNSTILE_TEST_REDIS_DSN").ok()?;
        let client = redis::Client::open(dsn).unwrap();
        let manager = client.get_connection_manager().await.unwrap();
        Some(RedisRefreshStore::new(
            manager,
            format!("test-refresh-{}", uuid::Uuid::new_v4()),
        ))
    }

    #[tokio::test]
    async fn revoke_script_reports_each_status() {
        let Some(store) = store().await else {
            return;
        };
        let rec = store.create(&UserId::from("u1"), WEEK).await.unwrap();
        let found = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(found.id, rec.id);
        assert_eq!(
            found.expires_at.timestamp_millis(),
            rec.expires_at.timestamp_millis()
        );

        let first = match store.revoke(&rec.token).await.unwrap() {
            RevokeOutcome::Revoked(at) => at,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            store.revoke(&rec.token).await.unwrap(),
            RevokeOutcome::AlreadyRevoked(first)
        );
        assert_eq!(
            store.get_by_token(&rec.token).await.unwrap().revoked_at,
            Some(first)
        );

        let unknown = new_token_value();
        assert!(matches!(
            store.revoke(&unknown).await,
            Err(RefreshStoreError::NotFound)
        ));
        assert!(matches!(
            store.get_by_token(&unknown).await,
            Err(RefreshStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_revokes_have_one_winner() {
        let Some(store) = store().await else {
            return;
        };
        let store = Arc::new(store);
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

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn decodes_active_and_revoked_records() {
        let token = RefreshTokenValue("t".to_string());
        let id = uuid::Uuid::new_v4().to_string();

        let active = record_from_fields(
            &fields(&[("id", &id), ("user_id", "u1"), ("expires_at", "1700000000000")]),
            &token,
        )
        .unwrap();
        assert_eq!(active.owner_id, UserId::from("u1"));
        assert_eq!(active.expires_at.timestamp(), 1_700_000_000);
        assert!(active.revoked_at.is_none());

        let revoked = record_from_fields(
            &fields(&[
                ("id", &id),
                ("user_id", "u1"),
                ("expires_at", "1700000000000"),
                ("revoked_at", "1690000000123"),
            ]),
            &token,
        )
        .unwrap();
        assert_eq!(
            revoked.revoked_at.map(|at| at.timestamp_millis()),
            Some(1_690_000_000_123)
        );
    }

    #[test]
    fn rejects_corrupt_records() {
        let token = RefreshTokenValue("t".to_string());
        assert!(record_from_fields(&fields(&[("user_id", "u1")]), &token).is_err());
        assert!(
            record_from_fields(
                &fields(&[
                    ("id", "not-a-uuid"),
                    ("user_id", "u1"),
                    ("expires_at", "1")
                ]),
                &token
            )
            .is_err()
        );
    }
}
