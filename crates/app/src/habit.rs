use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use tracing::info;

use greencity_core::dto::HabitTranslationDto;
use greencity_core::page::{PageRequest, PageableDto};
use greencity_core::types::{Language, User};
use greencity_storage::{Database, HabitRepository};

use crate::auth::{CurrentUser, Moderator};
use crate::error::ServiceError;
use crate::extract::{ApiPath, ApiQuery};
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Clone)]
pub struct HabitService {
    habits: HabitRepository,
}

impl HabitService {
    pub fn new(database: &Database) -> Self {
        Self {
            habits: database.habits(),
        }
    }

    pub async fn find_all(
        &self,
        page: PageRequest,
        language: Language,
    ) -> Result<PageableDto<HabitTranslationDto>, ServiceError> {
        let rows = self.habits.find_all_by_language_code(page, language).await?;
        let total = self.habits.count_by_language_code(language).await?;
        Ok(PageableDto::new(rows, total, page))
    }

    pub async fn find_by_tags(
        &self,
        page: PageRequest,
        tags: &[String],
        language: Language,
    ) -> Result<PageableDto<HabitTranslationDto>, ServiceError> {
        let rows = self
            .habits
            .find_all_by_tags_and_language_code(page, tags, language)
            .await?;
        let total = self
            .habits
            .count_by_tags_and_language_code(tags, language)
            .await?;
        Ok(PageableDto::new(rows, total, page))
    }

    pub async fn find_by_id(
        &self,
        habit_id: i64,
        language: Language,
    ) -> Result<HabitTranslationDto, ServiceError> {
        self.habits
            .find_by_habit_and_language_code(habit_id, language)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "habit {habit_id} has no '{}' translation",
                    language.code()
                ))
            })
    }

    /// Habits assigned to `user_id`. Other users' assignments are visible to moderators only.
    pub async fn assigned(
        &self,
        caller: &User,
        user_id: i64,
        language: Language,
        acquired: bool,
    ) -> Result<Vec<HabitTranslationDto>, ServiceError> {
        if caller.id != user_id && !caller.role.can_moderate() {
            return Err(ServiceError::Forbidden(format!(
                "user {} may not view habits of user {user_id}",
                caller.id
            )));
        }
        Ok(self
            .habits
            .find_by_user_and_acquired_status(user_id, language, acquired)
            .await?)
    }

    pub async fn delete(&self, habit_id: i64) -> Result<(), ServiceError> {
        if !self.habits.delete_habit(habit_id).await? {
            return Err(ServiceError::not_found("habit", habit_id));
        }
        info!(stage = "habit", habit_id, "habit deleted");
        Ok(())
    }
}

/// Splits a comma separated tag list, dropping blanks.
fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct HabitPageQuery {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TagSearchQuery {
    tags: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignedQuery {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    acquired: bool,
}

pub async fn find_all(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HabitPageQuery>,
) -> Result<Json<PageableDto<HabitTranslationDto>>, ProblemResponse> {
    let language = Language::resolve(query.language.as_deref()).map_err(ServiceError::from)?;
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let service = HabitService::new(state.storage());
    Ok(Json(service.find_all(page, language).await?))
}

pub async fn find_by_tags(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TagSearchQuery>,
) -> Result<Json<PageableDto<HabitTranslationDto>>, ProblemResponse> {
    let language = Language::resolve(query.language.as_deref()).map_err(ServiceError::from)?;
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let tags = parse_tags(&query.tags);
    if tags.is_empty() {
        return Err(ServiceError::BadRequest("at least one tag is required".into()).into());
    }
    let service = HabitService::new(state.storage());
    Ok(Json(service.find_by_tags(page, &tags, language).await?))
}

pub async fn find_by_id(
    State(state): State<AppState>,
    ApiPath(habit_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<LanguageQuery>,
) -> Result<Json<HabitTranslationDto>, ProblemResponse> {
    let language = Language::resolve(query.language.as_deref()).map_err(ServiceError::from)?;
    let service = HabitService::new(state.storage());
    Ok(Json(service.find_by_id(habit_id, language).await?))
}

pub async fn assigned(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<AssignedQuery>,
) -> Result<Json<Vec<HabitTranslationDto>>, ProblemResponse> {
    let language = Language::resolve(query.language.as_deref()).map_err(ServiceError::from)?;
    let service = HabitService::new(state.storage());
    Ok(Json(
        service
            .assigned(&caller, user_id, language, query.acquired)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiPath(habit_id): ApiPath<i64>,
) -> Result<Json<i64>, ProblemResponse> {
    HabitService::new(state.storage()).delete(habit_id).await?;
    info!(stage = "management", moderator = moderator.id(), habit_id, "habit deleted");
    Ok(Json(habit_id))
}
