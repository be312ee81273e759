use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::Principal,
};

/// Read access to principals, owned by the user-data side of the system.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Finds an active principal by login identifier.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>>;

    /// Finds an active principal by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>>;
}

/// A helper function to map a `tokio_postgres::Row` to a `Principal`.
fn row_to_principal(row: &Row) -> Result<Principal> {
    let id: Uuid = row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?;
    let identifier: String = row
        .try_get("username")
        .map_err(|_| AppError::MissingData("username".to_string()))?;
    let password_hash: String = row
        .try_get("password")
        .map_err(|_| AppError::MissingData("password".to_string()))?;
    Ok(Principal::new(id, identifier, password_hash))
}

/// PostgreSQL-backed principal lookups against the `users` table.
#[derive(Clone)]
pub struct PgPrincipalDirectory {
    pool: Pool,
}

impl PgPrincipalDirectory {
    /// Creates a new `PgPrincipalDirectory`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgPrincipalDirectory {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, username, password
                FROM users
                WHERE username = $1 AND is_active = true
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&identifier]).await?;
        row.map(|r| row_to_principal(&r)).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, username, password
                FROM users
                WHERE id = $1 AND is_active = true
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&id]).await?;
        row.map(|r| row_to_principal(&r)).transpose()
    }
}
