use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use greencity_core::types::Category;

use crate::{is_foreign_key_violation, is_unique_violation};

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    parent_category_id: Option<i64>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            parent_category_id: row.parent_category_id,
        }
    }
}

/// Repository over the `categories` table.
#[derive(Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Exact, case-sensitive name match.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Category>, CategoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, parent_category_id FROM categories WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Category::from))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Category>, CategoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, parent_category_id FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Category::from))
    }

    /// All categories ordered by id.
    pub async fn find_all(&self) -> Result<Vec<Category>, CategoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, parent_category_id FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    /// Inserts a category. The unique index on `name` surfaces as [`CategoryError::DuplicateName`].
    pub async fn insert(
        &self,
        name: &str,
        parent_category_id: Option<i64>,
    ) -> Result<Category, CategoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (name, parent_category_id) VALUES (?, ?) \
             RETURNING id, name, parent_category_id",
        )
        .bind(name)
        .bind(parent_category_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify(err, name))?;
        Ok(row.into())
    }

    /// Returns the category named `name`, inserting it inside `tx` when absent.
    pub async fn find_or_insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
        parent_category_id: Option<i64>,
    ) -> Result<Category, CategoryError> {
        let existing = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, parent_category_id FROM categories WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (name, parent_category_id) VALUES (?, ?) \
             RETURNING id, name, parent_category_id",
        )
        .bind(name)
        .bind(parent_category_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| classify(err, name))?;
        Ok(row.into())
    }

    /// Overwrites name and parent of an existing category.
    pub async fn update(
        &self,
        id: i64,
        name: &str,
        parent_category_id: Option<i64>,
    ) -> Result<Option<Category>, CategoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE categories SET name = ?, parent_category_id = ? WHERE id = ? \
             RETURNING id, name, parent_category_id",
        )
        .bind(name)
        .bind(parent_category_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| classify(err, name))?;
        Ok(row.map(Category::from))
    }

    /// Deletes a category. Sub-categories are detached by the schema; referencing places block it.
    pub async fn delete(&self, id: i64) -> Result<bool, CategoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    CategoryError::InUse(id)
                } else {
                    CategoryError::Database(err)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }
}

fn classify(err: sqlx::Error, name: &str) -> CategoryError {
    if is_unique_violation(&err) {
        CategoryError::DuplicateName(name.to_string())
    } else if is_foreign_key_violation(&err) {
        CategoryError::MissingParent
    } else {
        CategoryError::Database(err)
    }
}

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("category '{0}' already exists")]
    DuplicateName(String),
    #[error("parent category does not exist")]
    MissingParent,
    #[error("category {0} is still referenced by places")]
    InUse(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
