use thiserror::Error;

use crate::types::{EcoNewsComment, User};

pub const MAX_COMMENT_LENGTH: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentRuleError {
    #[error("comment text must not be blank")]
    BlankText,
    #[error("comment text must be at most {MAX_COMMENT_LENGTH} characters")]
    TooLong,
    #[error("parent comment {0} belongs to another news item")]
    ParentFromOtherNews(i64),
    #[error("parent comment {0} is deleted")]
    ParentDeleted(i64),
    #[error("cannot reply to reply {0}")]
    ReplyToReply(i64),
    #[error("user {user_id} may not modify comment {comment_id}")]
    NotPermitted { user_id: i64, comment_id: i64 },
    #[error("comment {0} is deleted and can no longer be edited")]
    Deleted(i64),
}

/// Trims the text and checks its length in characters.
pub fn normalize_text(raw: &str) -> Result<String, CommentRuleError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(CommentRuleError::BlankText);
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CommentRuleError::TooLong);
    }
    Ok(text.to_string())
}

/// Threads are one level deep: only live top-level comments of the same news accept replies.
pub fn check_reply_target(news_id: i64, parent: &EcoNewsComment) -> Result<(), CommentRuleError> {
    if parent.eco_news_id != news_id {
        return Err(CommentRuleError::ParentFromOtherNews(parent.id));
    }
    if parent.is_reply() {
        return Err(CommentRuleError::ReplyToReply(parent.id));
    }
    if parent.deleted {
        return Err(CommentRuleError::ParentDeleted(parent.id));
    }
    Ok(())
}

/// Authors, moderators and admins may delete a comment.
pub fn check_can_delete(user: &User, comment: &EcoNewsComment) -> Result<(), CommentRuleError> {
    if comment.author_id == user.id || user.role.can_moderate() {
        Ok(())
    } else {
        Err(CommentRuleError::NotPermitted {
            user_id: user.id,
            comment_id: comment.id,
        })
    }
}

/// Only the author may edit, and only while the comment is live.
pub fn check_can_edit(user: &User, comment: &EcoNewsComment) -> Result<(), CommentRuleError> {
    if comment.author_id != user.id {
        return Err(CommentRuleError::NotPermitted {
            user_id: user.id,
            comment_id: comment.id,
        });
    }
    if comment.deleted {
        return Err(CommentRuleError::Deleted(comment.id));
    }
    Ok(())
}
