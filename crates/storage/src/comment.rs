use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use greencity_core::page::PageRequest;
use greencity_core::types::EcoNewsComment;

use crate::to_rfc3339;

/// Which comments a listing or count includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentScope {
    /// Every comment, soft-deleted ones included.
    All,
    /// Only comments with `deleted = 0`.
    Active,
}

impl CommentScope {
    fn active_only(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Outcome of toggling a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Added,
    Removed,
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: i64,
    eco_news_id: i64,
    parent_comment_id: Option<i64>,
    author_id: i64,
    text: String,
    created_date: DateTime<Utc>,
    modified_date: DateTime<Utc>,
    deleted: bool,
}

impl From<CommentRow> for EcoNewsComment {
    fn from(row: CommentRow) -> Self {
        EcoNewsComment {
            id: row.id,
            eco_news_id: row.eco_news_id,
            parent_comment_id: row.parent_comment_id,
            author_id: row.author_id,
            text: row.text,
            created_date: row.created_date,
            modified_date: row.modified_date,
            deleted: row.deleted,
        }
    }
}

/// A comment joined with its author, derived like/reply counts and the viewer's like.
#[derive(Debug, sqlx::FromRow)]
pub struct CommentViewRow {
    pub id: i64,
    pub eco_news_id: i64,
    pub parent_comment_id: Option<i64>,
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub deleted: bool,
    pub likes: i64,
    pub replies: i64,
    pub current_user_liked: bool,
}

impl CommentViewRow {
    pub fn comment(&self) -> EcoNewsComment {
        EcoNewsComment {
            id: self.id,
            eco_news_id: self.eco_news_id,
            parent_comment_id: self.parent_comment_id,
            author_id: self.author_id,
            text: self.text.clone(),
            created_date: self.created_date,
            modified_date: self.modified_date,
            deleted: self.deleted,
        }
    }
}

/// Parameters required to insert a comment.
pub struct NewComment<'a> {
    pub eco_news_id: i64,
    pub parent_comment_id: Option<i64>,
    pub author_id: i64,
    pub text: &'a str,
    pub created_at: DateTime<Utc>,
}

const COMMENT_COLUMNS: &str =
    "id, eco_news_id, parent_comment_id, author_id, text, created_date, modified_date, deleted";

// The first bind is the viewer id (NULL for anonymous callers).
const COMMENT_VIEW_SELECT: &str = r#"
SELECT c.id,
       c.eco_news_id,
       c.parent_comment_id,
       c.author_id,
       u.name AS author_name,
       c.text,
       c.created_date,
       c.modified_date,
       c.deleted,
       (SELECT COUNT(*) FROM eco_news_comment_likes AS l WHERE l.comment_id = c.id) AS likes,
       (SELECT COUNT(*) FROM eco_news_comments AS r
         WHERE r.parent_comment_id = c.id AND r.deleted = 0) AS replies,
       EXISTS (SELECT 1 FROM eco_news_comment_likes AS l
                WHERE l.comment_id = c.id AND l.user_id = ?) AS current_user_liked
  FROM eco_news_comments AS c
  JOIN users AS u ON u.id = c.author_id
"#;

/// Repository for eco-news comments and their like relation.
#[derive(Clone)]
pub struct CommentRepository {
    pool: SqlitePool,
}

impl CommentRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, comment: &NewComment<'_>) -> Result<EcoNewsComment, CommentError> {
        let created = to_rfc3339(comment.created_at);
        let sql = format!(
            "INSERT INTO eco_news_comments \
             (eco_news_id, parent_comment_id, author_id, text, created_date, modified_date, deleted) \
             VALUES (?, ?, ?, ?, ?, ?, 0) RETURNING {COMMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(comment.eco_news_id)
            .bind(comment.parent_comment_id)
            .bind(comment.author_id)
            .bind(comment.text)
            .bind(&created)
            .bind(&created)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<EcoNewsComment>, CommentError> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM eco_news_comments WHERE id = ?");
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EcoNewsComment::from))
    }

    /// Top-level comments of a news item, newest first with id as tie break.
    pub async fn list_top_level(
        &self,
        eco_news_id: i64,
        scope: CommentScope,
        page: PageRequest,
        viewer_id: Option<i64>,
    ) -> Result<Vec<CommentViewRow>, CommentError> {
        let sql = format!(
            "{COMMENT_VIEW_SELECT} \
             WHERE c.eco_news_id = ? AND c.parent_comment_id IS NULL AND (? = 0 OR c.deleted = 0) \
             ORDER BY c.created_date DESC, c.id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, CommentViewRow>(&sql)
            .bind(viewer_id)
            .bind(eco_news_id)
            .bind(scope.active_only())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Cardinality of the set [`Self::list_top_level`] pages over.
    pub async fn count_top_level(
        &self,
        eco_news_id: i64,
        scope: CommentScope,
    ) -> Result<i64, CommentError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM eco_news_comments \
             WHERE eco_news_id = ? AND parent_comment_id IS NULL AND (? = 0 OR deleted = 0)",
        )
        .bind(eco_news_id)
        .bind(scope.active_only())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Replies whose parent is `parent_id`, oldest first with id as tie break.
    pub async fn list_replies(
        &self,
        parent_id: i64,
        scope: CommentScope,
        page: PageRequest,
        viewer_id: Option<i64>,
    ) -> Result<Vec<CommentViewRow>, CommentError> {
        let sql = format!(
            "{COMMENT_VIEW_SELECT} \
             WHERE c.parent_comment_id = ? AND (? = 0 OR c.deleted = 0) \
             ORDER BY c.created_date ASC, c.id ASC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, CommentViewRow>(&sql)
            .bind(viewer_id)
            .bind(parent_id)
            .bind(scope.active_only())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count_replies(
        &self,
        parent_id: i64,
        scope: CommentScope,
    ) -> Result<i64, CommentError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM eco_news_comments \
             WHERE parent_comment_id = ? AND (? = 0 OR deleted = 0)",
        )
        .bind(parent_id)
        .bind(scope.active_only())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Non-deleted comments of a news item, replies included.
    pub async fn count_active_for_news(&self, eco_news_id: i64) -> Result<i64, CommentError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM eco_news_comments WHERE eco_news_id = ? AND deleted = 0",
        )
        .bind(eco_news_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Flags the comment and its replies as deleted. Rows stay in place.
    pub async fn soft_delete_with_replies(&self, id: i64) -> Result<u64, CommentError> {
        let mut tx = self.pool.begin().await?;
        let replies = sqlx::query(
            "UPDATE eco_news_comments SET deleted = 1 WHERE parent_comment_id = ? AND deleted = 0",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let comment =
            sqlx::query("UPDATE eco_news_comments SET deleted = 1 WHERE id = ? AND deleted = 0")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(replies.rows_affected() + comment.rows_affected())
    }

    pub async fn update_text(
        &self,
        id: i64,
        text: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, CommentError> {
        let result =
            sqlx::query("UPDATE eco_news_comments SET text = ?, modified_date = ? WHERE id = ?")
                .bind(text)
                .bind(to_rfc3339(modified_at))
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records the viewer's like, or removes it when already present. Both steps share a transaction.
    pub async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle, CommentError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO eco_news_comment_likes (comment_id, user_id) VALUES (?, ?)",
        )
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let toggle = if inserted.rows_affected() > 0 {
            LikeToggle::Added
        } else {
            sqlx::query("DELETE FROM eco_news_comment_likes WHERE comment_id = ? AND user_id = ?")
                .bind(comment_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            LikeToggle::Removed
        };
        tx.commit().await?;
        Ok(toggle)
    }

    pub async fn count_likes(&self, comment_id: i64) -> Result<i64, CommentError> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM eco_news_comment_likes WHERE comment_id = ?")
                .bind(comment_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
