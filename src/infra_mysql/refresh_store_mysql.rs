use super::util::is_dup_key;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::time::Duration;
use uuid::Uuid;

const MAX_INSERT_ATTEMPTS: usize = 3;

pub struct MySqlRefreshStore {
    pool: MySqlPool,
}

impl MySqlRefreshStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRefreshStore { pool }
    }

    fn row_to_record(
        row: MySqlRow,
        token: &RefreshTokenValue,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let id_bytes: Vec<u8> = row
            .try_get("id")
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        let id = Uuid::from_slice(&id_bytes)
            .map(RefreshRecordId)
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        let revoked_at: Option<DateTime<Utc>> = row
            .try_get("revoked_at")
            .map_err(|e| RefreshStoreError::Store(e.to_string()))?;

        Ok(RefreshRecord {
            id,
            owner_id: UserId(user_id),
            token: token.clone(),
            expires_at,
            revoked_at,
        })
    }

    async fn revoked_at(
        &self,
        digest: &str,
    ) -> Result<Option<DateTime<Utc>>, RefreshStoreError> {
        let row: Option<MySqlRow> =
            sqlx::query("SELECT revoked_at FROM refresh_token WHERE token_hash = ?")
                .bind(digest)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        let row = row.ok_or(RefreshStoreError::NotFound)?;
        row.try_get("revoked_at")
            .map_err(|e| RefreshStoreError::Store(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RefreshStore for MySqlRefreshStore {
    async fn create(
        &self,
        owner: &UserId,
        ttl: Duration,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let expires_at = expiry_from_now(ttl)?;

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let id = new_record_id();
            let token = new_token_value();
            let result = sqlx::query(
                r#"
INSERT INTO refresh_token (id, user_id, token_hash, expires_at)
VALUES (?, ?, ?, ?)
"#,
            )
            .bind(id.0.as_bytes() as &[u8])
            .bind(owner.as_str())
            .bind(token_digest(&token))
            .bind(expires_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    return Ok(RefreshRecord {
                        id,
                        owner_id: owner.clone(),
                        token,
                        expires_at,
                        revoked_at: None,
                    });
                }
                // token values are never reused, not even those of dead records
                Err(e) if is_dup_key(&e) => continue,
                Err(e) => return Err(RefreshStoreError::Store(e.to_string())),
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
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, user_id, expires_at, revoked_at
FROM refresh_token
WHERE token_hash = ?
"#,
        )
        .bind(token_digest(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RefreshStoreError::Store(e.to_string()))?;

        let row = row_opt.ok_or(RefreshStoreError::NotFound)?;
        Self::row_to_record(row, token)
    }

    async fn revoke(&self, token: &RefreshTokenValue) -> Result<RevokeOutcome, RefreshStoreError> {
        let digest = token_digest(token);
        let now = Utc::now();

        // conditional update: of several racing callers exactly one sees a changed row
        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked_at = ?
WHERE token_hash = ? AND revoked_at IS NULL
"#,
        )
        .bind(now)
        .bind(&digest)
        .execute(&self.pool)
        .await
        .map_err(|e| RefreshStoreError::Store(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(RevokeOutcome::Revoked(now));
        }

        match self.revoked_at(&digest).await? {
            Some(at) => Ok(RevokeOutcome::AlreadyRevoked(at)),
            None => Err(RefreshStoreError::Store(
                "revoke matched no row but record is still active".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::mysql::MySqlPoolOptions;
    use std::sync::Arc;

    const SCHEMA: &str = include_str!("../../schema/mysql.sql");
    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Needs `TURNSTILE_TEST_MYSQL_DSN` pointing at a scratch database; skipped otherwise.
    async fn store() -> Option<MySqlRefreshStore> {
        let dsn = std::env::var("TURNSTILE_TEST_MYSQL_DSN").ok()?;
        let pool = MySqlPoolOptions::new()
            .max_connections(8)
            .connect(&dsn)
            .await
            .unwrap();
        sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
        Some(MySqlRefreshStore::new(pool))
    }

    #[tokio::test]
    async fn revoke_distinguishes_first_and_repeat() {
        let Some(store) = store().await else {
            return;
        };
        let rec = store.create(&UserId::from("u1"), WEEK).await.unwrap();
        let found = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(found.id, rec.id);
        assert!(found.revoked_at.is_none());

        let first = match store.revoke(&rec.token).await.unwrap() {
            RevokeOutcome::Revoked(at) => at,
            other => panic!("unexpected {:?}", other),
        };
        let repeat = match store.revoke(&rec.token).await.unwrap() {
            RevokeOutcome::AlreadyRevoked(at) => at,
            other => panic!("unexpected {:?}", other),
        };
        // DATETIME(6) keeps microseconds
        assert_eq!(repeat.timestamp_micros(), first.timestamp_micros());

        let stored = store.get_by_token(&rec.token).await.unwrap();
        assert_eq!(
            stored.revoked_at.map(|at| at.timestamp_micros()),
            Some(first.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let Some(store) = store().await else {
            return;
        };
        let token = new_token_value();
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
}
