use sqlx::{Row, SqlitePool};
use thiserror::Error;

use greencity_core::types::{Role, User};

/// Repository used to resolve authenticated callers.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads a user by primary key.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserError> {
        let row = sqlx::query("SELECT id, email, name, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role: String = row.get("role");
        let role = role
            .parse::<Role>()
            .map_err(|err| UserError::InvalidRole(err.value))?;
        Ok(Some(User {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            role,
        }))
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("stored role '{0}' is not recognised")]
    InvalidRole(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only access to eco-news items that comments hang off.
#[derive(Clone)]
pub struct EcoNewsRepository {
    pool: SqlitePool,
}

impl EcoNewsRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM eco_news WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::setup_db;
    use greencity_core::types::Role;

    #[tokio::test]
    async fn find_by_id_maps_role() {
        let db = setup_db().await;
        let admin = db
            .users()
            .find_by_id(3)
            .await
            .expect("query")
            .expect("admin exists");
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email, "admin@example.com");

        assert!(db.users().find_by_id(42).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn eco_news_existence() {
        let db = setup_db().await;
        assert!(db.eco_news().exists(1).await.expect("query"));
        assert!(!db.eco_news().exists(9).await.expect("query"));
    }
}
