use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use sqlx::{Sqlite, Transaction};
use tracing::info;

use greencity_core::dto::CategoryDto;
use greencity_core::types::Category;
use greencity_storage::{CategoryRepository, Database};

use crate::auth::Moderator;
use crate::error::ServiceError;
use crate::extract::{ApiJson, ApiPath};
use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Category management. Names are unique across the table.
#[derive(Clone)]
pub struct CategoryService {
    repo: CategoryRepository,
}

impl CategoryService {
    pub fn new(database: &Database) -> Self {
        Self {
            repo: database.categories(),
        }
    }

    pub async fn save(&self, dto: &CategoryDto) -> Result<Category, ServiceError> {
        let name = required_name(&dto.name)?;
        if self.find_by_name(name).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "category '{name}' already exists"
            )));
        }
        if let Some(parent_id) = dto.parent_category_id {
            self.find_by_id(parent_id).await?;
        }
        let category = self.repo.insert(name, dto.parent_category_id).await?;
        info!(stage = "category", id = category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn find_all(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.repo.find_all().await?)
    }

    pub async fn find_all_category_dto(&self) -> Result<Vec<CategoryDto>, ServiceError> {
        let categories = self.find_all().await?;
        Ok(categories
            .into_iter()
            .map(|category| CategoryDto {
                name: category.name,
                parent_category_id: category.parent_category_id,
            })
            .collect())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Category, ServiceError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("category", id))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Category>, ServiceError> {
        Ok(self.repo.find_by_name(name).await?)
    }

    /// Returns the category named in `dto`, creating it inside `tx` when absent.
    pub async fn find_or_create(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        dto: &CategoryDto,
    ) -> Result<Category, ServiceError> {
        let name = required_name(&dto.name)?;
        Ok(self
            .repo
            .find_or_insert(tx, name, dto.parent_category_id)
            .await?)
    }

    /// Overwrites name and parent of category `id` and returns the stored record.
    pub async fn update(&self, id: i64, dto: &CategoryDto) -> Result<Category, ServiceError> {
        let current = self.find_by_id(id).await?;
        let name = required_name(&dto.name)?;
        if dto.parent_category_id == Some(id) {
            return Err(ServiceError::BadRequest(format!(
                "category {id} cannot be its own parent"
            )));
        }
        if let Some(other) = self.repo.find_by_name(name).await? {
            if other.id != current.id {
                return Err(ServiceError::Conflict(format!(
                    "category '{name}' already exists"
                )));
            }
        }
        if let Some(parent_id) = dto.parent_category_id {
            self.find_by_id(parent_id).await?;
        }

        let updated = self
            .repo
            .update(current.id, name, dto.parent_category_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("category", id))?;
        info!(stage = "category", id, name = %updated.name, "category updated");
        Ok(updated)
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<i64, ServiceError> {
        self.find_by_id(id).await?;
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found("category", id));
        }
        info!(stage = "category", id, "category deleted");
        Ok(id)
    }
}

fn required_name(raw: &str) -> Result<&str, ServiceError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ServiceError::BadRequest(
            "category name must not be blank".into(),
        ));
    }
    Ok(name)
}

pub async fn find_all_dto(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryDto>>, ProblemResponse> {
    let service = CategoryService::new(state.storage());
    Ok(Json(service.find_all_category_dto().await?))
}

pub async fn find_by_id(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Category>, ProblemResponse> {
    let service = CategoryService::new(state.storage());
    Ok(Json(service.find_by_id(id).await?))
}

pub async fn find_all(
    State(state): State<AppState>,
    _moderator: Moderator,
) -> Result<Json<Vec<Category>>, ProblemResponse> {
    let service = CategoryService::new(state.storage());
    Ok(Json(service.find_all().await?))
}

pub async fn save(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiJson(dto): ApiJson<CategoryDto>,
) -> Result<(StatusCode, Json<Category>), ProblemResponse> {
    let service = CategoryService::new(state.storage());
    let category = service.save(&dto).await?;
    info!(stage = "management", moderator = moderator.id(), id = category.id, "category saved");
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiPath(id): ApiPath<i64>,
    ApiJson(dto): ApiJson<CategoryDto>,
) -> Result<Json<Category>, ProblemResponse> {
    let service = CategoryService::new(state.storage());
    let updated = service.update(id, &dto).await?;
    info!(stage = "management", moderator = moderator.id(), id, "category updated");
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<i64>, ProblemResponse> {
    let service = CategoryService::new(state.storage());
    let deleted = service.delete_by_id(id).await?;
    info!(stage = "management", moderator = moderator.id(), id, "category deleted");
    Ok(Json(deleted))
}
