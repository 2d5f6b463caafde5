use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use greencity_core::dto::{GoalDto, ShoppingListDtoResponse};
use greencity_core::types::{GoalStatus, Language};

use crate::to_rfc3339;

/// Identifies the goal side of a shopping-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalRef {
    Goal(i64),
    Custom(i64),
}

#[derive(Debug, sqlx::FromRow)]
struct ShoppingListRow {
    id: i64,
    goal_id: Option<i64>,
    custom_goal_id: Option<i64>,
    text: Option<String>,
    status: String,
}

impl ShoppingListRow {
    fn into_dto(self) -> Result<ShoppingListDtoResponse, GoalError> {
        let status = self
            .status
            .parse::<GoalStatus>()
            .map_err(|err| GoalError::InvalidStoredValue(err.to_string()))?;
        Ok(ShoppingListDtoResponse {
            id: self.id,
            goal_id: self.goal_id,
            custom_goal_id: self.custom_goal_id,
            text: self.text.unwrap_or_default(),
            status,
        })
    }
}

// Binds: language code, user id, then the optional user-goal id filter.
const SHOPPING_LIST_SELECT: &str = r#"
SELECT ug.id,
       ug.goal_id,
       ug.custom_goal_id,
       COALESCE(gt.text, cg.text) AS text,
       ug.status
  FROM user_goals AS ug
  LEFT JOIN goal_translations AS gt
    ON gt.goal_id = ug.goal_id
   AND gt.language_code = ?
  LEFT JOIN custom_goals AS cg
    ON cg.id = ug.custom_goal_id
 WHERE ug.user_id = ?
"#;

/// Repository for goals, their translations and users' shopping lists.
#[derive(Clone)]
pub struct GoalRepository {
    pool: SqlitePool,
}

impl GoalRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Goals translated into `language`, ordered by goal id. Untranslated goals are skipped.
    pub async fn find_all_by_language(&self, language: Language) -> Result<Vec<GoalDto>, GoalError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT g.id, gt.text FROM goals AS g \
             JOIN goal_translations AS gt ON gt.goal_id = g.id AND gt.language_code = ? \
             ORDER BY g.id",
        )
        .bind(language.code())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, text)| GoalDto { id, text })
            .collect())
    }

    /// A user's shopping list ordered by entry id.
    pub async fn shopping_list(
        &self,
        user_id: i64,
        language: Language,
    ) -> Result<Vec<ShoppingListDtoResponse>, GoalError> {
        let sql = format!("{SHOPPING_LIST_SELECT} ORDER BY ug.id");
        let rows = sqlx::query_as::<_, ShoppingListRow>(&sql)
            .bind(language.code())
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ShoppingListRow::into_dto).collect()
    }

    /// One shopping-list entry by id, scoped to its owner.
    pub async fn shopping_list_entry(
        &self,
        user_id: i64,
        entry_id: i64,
        language: Language,
    ) -> Result<Option<ShoppingListDtoResponse>, GoalError> {
        let sql = format!("{SHOPPING_LIST_SELECT} AND ug.id = ?");
        let row = sqlx::query_as::<_, ShoppingListRow>(&sql)
            .bind(language.code())
            .bind(user_id)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ShoppingListRow::into_dto).transpose()
    }

    /// Sets the status of the user's entry for `goal`, returning the entry id when it exists.
    pub async fn update_status(
        &self,
        user_id: i64,
        goal: GoalRef,
        status: GoalStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<i64>, GoalError> {
        let date_completed = match status {
            GoalStatus::Done => Some(to_rfc3339(changed_at)),
            GoalStatus::Active => None,
        };
        let (column, id) = match goal {
            GoalRef::Goal(id) => ("goal_id", id),
            GoalRef::Custom(id) => ("custom_goal_id", id),
        };
        let sql = format!(
            "UPDATE user_goals SET status = ?, date_completed = ? \
             WHERE user_id = ? AND {column} = ? RETURNING id"
        );
        let updated = sqlx::query_scalar(&sql)
            .bind(status.as_str())
            .bind(date_completed)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }
}

#[derive(Debug, Error)]
pub enum GoalError {
    #[error("invalid stored value: {0}")]
    InvalidStoredValue(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
