use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a textual enum value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Role carried by an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_MODERATOR")]
    Moderator,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "ROLE_USER",
            Self::Moderator => "ROLE_MODERATOR",
            Self::Admin => "ROLE_ADMIN",
        }
    }

    /// Moderators and admins may act on content they do not own.
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ROLE_USER" => Ok(Self::User),
            "ROLE_MODERATOR" => Ok(Self::Moderator),
            "ROLE_ADMIN" => Ok(Self::Admin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

/// The caller as resolved from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Moderation lifecycle of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaceStatus {
    Proposed,
    Approved,
    Declined,
    Deleted,
}

impl PlaceStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::Approved => "APPROVED",
            Self::Declined => "DECLINED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for PlaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "PROPOSED" => Ok(Self::Proposed),
            "APPROVED" => Ok(Self::Approved),
            "DECLINED" => Ok(Self::Declined),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(UnknownVariant::new("place status", value)),
        }
    }
}

/// Status of a goal on a user's shopping list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    Active,
    Done,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Done => "DONE",
        }
    }
}

impl FromStr for GoalStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "DONE" => Ok(Self::Done),
            _ => Err(UnknownVariant::new("goal status", value)),
        }
    }
}

/// Presentation status of a comment, derived from its flags and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommentStatus {
    Original,
    Edited,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl WeekDay {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "MONDAY",
            Self::Tuesday => "TUESDAY",
            Self::Wednesday => "WEDNESDAY",
            Self::Thursday => "THURSDAY",
            Self::Friday => "FRIDAY",
            Self::Saturday => "SATURDAY",
            Self::Sunday => "SUNDAY",
        }
    }
}

impl FromStr for WeekDay {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "MONDAY" => Ok(Self::Monday),
            "TUESDAY" => Ok(Self::Tuesday),
            "WEDNESDAY" => Ok(Self::Wednesday),
            "THURSDAY" => Ok(Self::Thursday),
            "FRIDAY" => Ok(Self::Friday),
            "SATURDAY" => Ok(Self::Saturday),
            "SUNDAY" => Ok(Self::Sunday),
            other => Err(UnknownVariant::new("week day", other)),
        }
    }
}

/// Languages that localized goals and habits are published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ua,
    #[default]
    En,
    Ru,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::Ua => "ua",
            Self::En => "en",
            Self::Ru => "ru",
        }
    }

    /// Resolves an optional language parameter, defaulting to English.
    pub fn resolve(value: Option<&str>) -> Result<Self, UnknownVariant> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(code) => code.parse(),
            None => Ok(Self::default()),
        }
    }
}

impl FromStr for Language {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ua" => Ok(Self::Ua),
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            _ => Err(UnknownVariant::new("language", value)),
        }
    }
}

/// A category row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_category_id: Option<i64>,
}

/// A place row without its dependent records.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub author_id: i64,
    pub status: Option<PlaceStatus>,
    pub modified_date: DateTime<Utc>,
}

/// An eco-news comment row. Replies carry the id of their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcoNewsComment {
    pub id: i64,
    pub eco_news_id: i64,
    pub parent_comment_id: Option<i64>,
    pub author_id: i64,
    pub text: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub deleted: bool,
}

impl EcoNewsComment {
    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }

    pub fn status(&self) -> CommentStatus {
        if self.deleted {
            CommentStatus::Deleted
        } else if self.modified_date > self.created_date {
            CommentStatus::Edited
        } else {
            CommentStatus::Original
        }
    }
}
