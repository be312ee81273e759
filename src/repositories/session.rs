//! Server-side session rows.
//!
//! Expected table:
//!
//! ```sql
//! CREATE TABLE sessions (
//!     principal_id  UUID        NOT NULL,
//!     token_digest  TEXT        NOT NULL UNIQUE,
//!     originated_at TIMESTAMPTZ NOT NULL,
//!     last_seen_at  TIMESTAMPTZ NOT NULL,
//!     remote_addr   TEXT        NOT NULL,
//!     user_agent    TEXT        NOT NULL,
//!     PRIMARY KEY (principal_id, token_digest)
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use sha2::{Digest, Sha256};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::crypto::token;
use crate::error::{AppError, Result};
use crate::models::session::SessionRecord;

/// Attempts made to find an unused token before giving up.
pub const MAX_TOKEN_ATTEMPTS: usize = 3;

/// Hashes an auth token for storage.
///
/// Tokens carry 256 bits of entropy, so a fast digest is enough to keep a
/// leaked table from yielding usable cookies.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Persistence for session rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Finds the row for a (principal, token) pair.
    async fn lookup(&self, principal_id: Uuid, token: &str) -> Result<Option<SessionRecord>>;

    /// Sets last-seen to now. Origination is never changed.
    async fn touch(&self, principal_id: Uuid, token: &str) -> Result<()>;

    /// Issues a new token and stores a row with origination = last-seen = now.
    async fn create(
        &self,
        principal_id: Uuid,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<String>;

    /// Removes one session.
    async fn delete(&self, principal_id: Uuid, token: &str) -> Result<()>;

    /// Removes every session belonging to a principal.
    ///
    /// Returns the number of sessions removed.
    async fn delete_all_for_principal(&self, principal_id: Uuid) -> Result<u64>;

    /// Physically removes rows already past either expiry clock.
    ///
    /// Returns the number of rows removed.
    async fn prune_expired(
        &self,
        originated_before: DateTime<Utc>,
        last_seen_before: DateTime<Utc>,
    ) -> Result<u64>;
}

/// A helper function to map a `tokio_postgres::Row` to a `SessionRecord`.
fn row_to_session(row: &Row) -> Result<SessionRecord> {
    Ok(SessionRecord {
        principal_id: row
            .try_get("principal_id")
            .map_err(|_| AppError::MissingData("principal_id".to_string()))?,
        token_digest: row
            .try_get("token_digest")
            .map_err(|_| AppError::MissingData("token_digest".to_string()))?,
        originated_at: row
            .try_get("originated_at")
            .map_err(|_| AppError::MissingData("originated_at".to_string()))?,
        last_seen_at: row
            .try_get("last_seen_at")
            .map_err(|_| AppError::MissingData("last_seen_at".to_string()))?,
        remote_addr: row
            .try_get("remote_addr")
            .map_err(|_| AppError::MissingData("remote_addr".to_string()))?,
        user_agent: row
            .try_get("user_agent")
            .map_err(|_| AppError::MissingData("user_agent".to_string()))?,
    })
}

const LOOKUP_SQL: &str = r#"
    SELECT principal_id, token_digest, originated_at, last_seen_at, remote_addr, user_agent
    FROM sessions
    WHERE principal_id = $1 AND token_digest = $2
"#;

const TOUCH_SQL: &str = r#"
    UPDATE sessions
    SET last_seen_at = NOW()
    WHERE principal_id = $1 AND token_digest = $2
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO sessions
        (principal_id, token_digest, originated_at, last_seen_at, remote_addr, user_agent)
    VALUES ($1, $2, NOW(), NOW(), $3, $4)
    ON CONFLICT DO NOTHING
"#;

const DELETE_SQL: &str = r#"
    DELETE FROM sessions
    WHERE principal_id = $1 AND token_digest = $2
"#;

const DELETE_ALL_SQL: &str = r#"
    DELETE FROM sessions
    WHERE principal_id = $1
"#;

const PRUNE_SQL: &str = r#"
    DELETE FROM sessions
    WHERE originated_at < $1 OR last_seen_at < $2
"#;

/// PostgreSQL-backed session store.
///
/// Statements are prepared once per pooled connection through deadpool's
/// statement cache.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn lookup(&self, principal_id: Uuid, token: &str) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(LOOKUP_SQL).await?;
        let row = client
            .query_opt(&statement, &[&principal_id, &token_digest(token)])
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn touch(&self, principal_id: Uuid, token: &str) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(TOUCH_SQL).await?;
        client
            .execute(&statement, &[&principal_id, &token_digest(token)])
            .await?;
        Ok(())
    }

    async fn create(
        &self,
        principal_id: Uuid,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<String> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(INSERT_SQL).await?;

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = token::generate_auth_token();
            let inserted = client
                .execute(
                    &statement,
                    &[&principal_id, &token_digest(&token), &remote_addr, &user_agent],
                )
                .await?;
            if inserted == 1 {
                tracing::debug!("✅ Session row created for principal: {}", principal_id);
                return Ok(token);
            }
            tracing::warn!("⚠️  Session token collision, regenerating");
        }

        Err(AppError::Internal(
            "Could not allocate a unique session token".to_string(),
        ))
    }

    async fn delete(&self, principal_id: Uuid, token: &str) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(DELETE_SQL).await?;
        client
            .execute(&statement, &[&principal_id, &token_digest(token)])
            .await?;
        Ok(())
    }

    async fn delete_all_for_principal(&self, principal_id: Uuid) -> Result<u64> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(DELETE_ALL_SQL).await?;
        Ok(client.execute(&statement, &[&principal_id]).await?)
    }

    async fn prune_expired(
        &self,
        originated_before: DateTime<Utc>,
        last_seen_before: DateTime<Utc>,
    ) -> Result<u64> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(PRUNE_SQL).await?;
        Ok(client
            .execute(&statement, &[&originated_before, &last_seen_before])
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let digest = token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("abc"));
        assert_ne!(digest, token_digest("abd"));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
