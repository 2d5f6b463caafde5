use thiserror::Error;

use greencity_core::comment::CommentRuleError;
use greencity_core::page::PageError;
use greencity_core::place::{PlaceRuleError, StatusTransitionError};
use greencity_core::types::UnknownVariant;
use greencity_storage::{
    CategoryError, CommentError, GoalError, HabitError, PlaceError, UserError,
};

/// Error returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    StatusUnchanged(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }

    /// Stable label for metrics and problem types.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::StatusUnchanged(_) => "status_unchanged",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<CategoryError> for ServiceError {
    fn from(err: CategoryError) -> Self {
        match err {
            CategoryError::DuplicateName(_) | CategoryError::InUse(_) => {
                Self::Conflict(err.to_string())
            }
            CategoryError::MissingParent => Self::NotFound(err.to_string()),
            CategoryError::Database(err) => Self::Storage(err.to_string()),
        }
    }
}

impl From<PlaceError> for ServiceError {
    fn from(err: PlaceError) -> Self {
        match err {
            PlaceError::LocationTaken { .. } => Self::BadRequest(err.to_string()),
            PlaceError::InvalidStoredValue(_) | PlaceError::Database(_) => {
                Self::Storage(err.to_string())
            }
        }
    }
}

impl From<CommentError> for ServiceError {
    fn from(err: CommentError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<GoalError> for ServiceError {
    fn from(err: GoalError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<HabitError> for ServiceError {
    fn from(err: HabitError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<UserError> for ServiceError {
    fn from(err: UserError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CommentRuleError> for ServiceError {
    fn from(err: CommentRuleError) -> Self {
        match err {
            CommentRuleError::NotPermitted { .. } => Self::Forbidden(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<PlaceRuleError> for ServiceError {
    fn from(err: PlaceRuleError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<StatusTransitionError> for ServiceError {
    fn from(err: StatusTransitionError) -> Self {
        match err {
            StatusTransitionError::Unchanged { .. } => Self::StatusUnchanged(err.to_string()),
            StatusTransitionError::MissingCurrentStatus { .. } => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<PageError> for ServiceError {
    fn from(err: PageError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<UnknownVariant> for ServiceError {
    fn from(err: UnknownVariant) -> Self {
        Self::BadRequest(err.to_string())
    }
}
