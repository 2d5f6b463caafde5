use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use thiserror::Error;

mod category;
mod comment;
mod goal;
mod habit;
mod place;
mod user;

pub use category::{CategoryError, CategoryRepository};
pub use comment::{CommentError, CommentRepository, CommentScope, CommentViewRow, LikeToggle, NewComment};
pub use goal::{GoalError, GoalRef, GoalRepository};
pub use habit::{HabitError, HabitRepository};
pub use place::{NewPlace, PlaceError, PlaceInfoRow, PlaceRepository};
pub use user::{EcoNewsRepository, UserError, UserRepository};

/// SQLite result code for a UNIQUE constraint violation.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
/// SQLite result code for a FOREIGN KEY constraint violation.
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for category lookups and mutations.
    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }

    /// Returns a handle for places and their location, hours and rates.
    pub fn places(&self) -> PlaceRepository {
        PlaceRepository::new(self.pool.clone())
    }

    /// Returns a handle for eco-news comments and likes.
    pub fn comments(&self) -> CommentRepository {
        CommentRepository::new(self.pool.clone())
    }

    /// Returns a handle for goals, custom goals and shopping lists.
    pub fn goals(&self) -> GoalRepository {
        GoalRepository::new(self.pool.clone())
    }

    /// Returns a handle for habit translations.
    pub fn habits(&self) -> HabitRepository {
        HabitRepository::new(self.pool.clone())
    }

    /// Returns a handle for reading users.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Returns a handle for eco-news existence checks.
    pub fn eco_news(&self) -> EcoNewsRepository {
        EcoNewsRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    constraint_code(err) == Some(SQLITE_CONSTRAINT_UNIQUE)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    constraint_code(err) == Some(SQLITE_CONSTRAINT_FOREIGNKEY)
}

fn constraint_code(err: &sqlx::Error) -> Option<&'static str> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    match db_err.code().as_deref() {
        Some(SQLITE_CONSTRAINT_UNIQUE) => Some(SQLITE_CONSTRAINT_UNIQUE),
        Some(SQLITE_CONSTRAINT_FOREIGNKEY) => Some(SQLITE_CONSTRAINT_FOREIGNKEY),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply() {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");

        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert!(tables.0 >= 17, "expected core tables to be created");
    }

    #[tokio::test]
    async fn file_database_uses_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("greencity.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .expect("journal mode");
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = test_support::setup_db().await;
        let err = sqlx::query(
            "INSERT INTO eco_news_comments (eco_news_id, author_id, text, created_date, modified_date) \
             VALUES (99, 1, 'orphan', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .expect_err("missing news should violate the foreign key");
        assert!(is_foreign_key_violation(&err));
    }
}
