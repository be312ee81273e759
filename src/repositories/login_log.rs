use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::error::Result;
use crate::models::login_attempt::LoginOutcome;

/// Append-only record of login attempts.
#[async_trait]
pub trait LoginAttemptLog: Send + Sync {
    /// Appends one attempt, timestamped by the log.
    async fn append(&self, identifier: &str, outcome: LoginOutcome) -> Result<()>;
}

/// PostgreSQL-backed login log.
///
/// Outcomes are resolved through the `login_status` lookup table by name.
#[derive(Clone)]
pub struct PgLoginAttemptLog {
    pool: Pool,
}

impl PgLoginAttemptLog {
    /// Creates a new `PgLoginAttemptLog`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptLog for PgLoginAttemptLog {
    async fn append(&self, identifier: &str, outcome: LoginOutcome) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO login_log (username, login_status_id, created_at)
                VALUES ($1, (SELECT id FROM login_status WHERE name = $2), NOW())
                "#,
            )
            .await?;
        client
            .execute(&statement, &[&identifier, &outcome.as_str()])
            .await?;
        Ok(())
    }
}
