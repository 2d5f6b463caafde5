use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;

use greencity_core::dto::HabitTranslationDto;
use greencity_core::page::PageRequest;
use greencity_core::types::Language;

#[derive(Debug, sqlx::FromRow)]
struct HabitTranslationRow {
    id: i64,
    habit_id: i64,
    language_code: String,
    name: String,
    description: Option<String>,
}

impl From<HabitTranslationRow> for HabitTranslationDto {
    fn from(row: HabitTranslationRow) -> Self {
        HabitTranslationDto {
            id: row.id,
            habit_id: row.habit_id,
            language_code: row.language_code,
            name: row.name,
            description: row.description,
        }
    }
}

const TRANSLATION_COLUMNS: &str =
    "ht.id, ht.habit_id, ht.language_code, ht.name, ht.description";

/// Repository over habits and their per-language translations.
#[derive(Clone)]
pub struct HabitRepository {
    pool: SqlitePool,
}

impl HabitRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, habit_id: i64) -> Result<bool, HabitError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM habits WHERE id = ?")
            .bind(habit_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn find_by_name_and_language_code(
        &self,
        name: &str,
        language: Language,
    ) -> Result<Option<HabitTranslationDto>, HabitError> {
        let sql = format!(
            "SELECT {TRANSLATION_COLUMNS} FROM habit_translations AS ht \
             WHERE ht.name = ? AND ht.language_code = ?"
        );
        let row = sqlx::query_as::<_, HabitTranslationRow>(&sql)
            .bind(name)
            .bind(language.code())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(HabitTranslationDto::from))
    }

    pub async fn find_by_habit_and_language_code(
        &self,
        habit_id: i64,
        language: Language,
    ) -> Result<Option<HabitTranslationDto>, HabitError> {
        let sql = format!(
            "SELECT {TRANSLATION_COLUMNS} FROM habit_translations AS ht \
             WHERE ht.habit_id = ? AND ht.language_code = ?"
        );
        let row = sqlx::query_as::<_, HabitTranslationRow>(&sql)
            .bind(habit_id)
            .bind(language.code())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(HabitTranslationDto::from))
    }

    /// Translations of habits assigned to `user_id` with the given acquired flag, by habit id.
    pub async fn find_by_user_and_acquired_status(
        &self,
        user_id: i64,
        language: Language,
        acquired: bool,
    ) -> Result<Vec<HabitTranslationDto>, HabitError> {
        let sql = format!(
            "SELECT DISTINCT {TRANSLATION_COLUMNS} FROM habit_translations AS ht \
             JOIN habit_assigns AS ha ON ha.habit_id = ht.habit_id \
             WHERE ha.user_id = ? AND ha.acquired = ? AND ht.language_code = ? \
             ORDER BY ht.habit_id"
        );
        let rows = sqlx::query_as::<_, HabitTranslationRow>(&sql)
            .bind(user_id)
            .bind(acquired)
            .bind(language.code())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HabitTranslationDto::from).collect())
    }

    pub async fn find_all_by_language_code(
        &self,
        page: PageRequest,
        language: Language,
    ) -> Result<Vec<HabitTranslationDto>, HabitError> {
        let sql = format!(
            "SELECT {TRANSLATION_COLUMNS} FROM habit_translations AS ht \
             WHERE ht.language_code = ? ORDER BY ht.habit_id LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, HabitTranslationRow>(&sql)
            .bind(language.code())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HabitTranslationDto::from).collect())
    }

    pub async fn count_by_language_code(&self, language: Language) -> Result<i64, HabitError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM habit_translations WHERE language_code = ?",
        )
        .bind(language.code())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Distinct translations whose habit carries any of `tags`, by habit id.
    pub async fn find_all_by_tags_and_language_code(
        &self,
        page: PageRequest,
        tags: &[String],
        language: Language,
    ) -> Result<Vec<HabitTranslationDto>, HabitError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = tagged_query(
            &format!("SELECT DISTINCT {TRANSLATION_COLUMNS}"),
            tags,
            language,
        );
        builder
            .push(" ORDER BY ht.habit_id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = builder
            .build_query_as::<HabitTranslationRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HabitTranslationDto::from).collect())
    }

    pub async fn count_by_tags_and_language_code(
        &self,
        tags: &[String],
        language: Language,
    ) -> Result<i64, HabitError> {
        if tags.is_empty() {
            return Ok(0);
        }
        let mut builder = tagged_query("SELECT COUNT(DISTINCT ht.id)", tags, language);
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Removes every translation of a habit, returning the number of rows deleted.
    pub async fn delete_all_by_habit(&self, habit_id: i64) -> Result<u64, HabitError> {
        let result = sqlx::query("DELETE FROM habit_translations WHERE habit_id = ?")
            .bind(habit_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes a habit together with its translations, tag links and assignments.
    pub async fn delete_habit(&self, habit_id: i64) -> Result<bool, HabitError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM habit_translations WHERE habit_id = ?")
            .bind(habit_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM habits WHERE id = ?")
            .bind(habit_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

fn tagged_query<'a>(
    select: &str,
    tags: &'a [String],
    language: Language,
) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(select);
    builder
        .push(
            " FROM habit_translations AS ht \
             JOIN habits_tags AS hgt ON hgt.habit_id = ht.habit_id \
             JOIN tags AS t ON t.id = hgt.tag_id \
             WHERE ht.language_code = ",
        )
        .push_bind(language.code())
        .push(" AND t.name IN (");
    let mut separated = builder.separated(", ");
    for tag in tags {
        separated.push_bind(tag.as_str());
    }
    separated.push_unseparated(")");
    builder
}

#[derive(Debug, Error)]
pub enum HabitError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
