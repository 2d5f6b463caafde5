use axum::{
    extract::State,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use greencity_core::dto::{GoalDto, ShoppingListDtoResponse};
use greencity_core::types::{GoalStatus, Language, User};
use greencity_storage::{Database, GoalRef, GoalRepository};

use crate::auth::CurrentUser;
use crate::error::ServiceError;
use crate::extract::{ApiPath, ApiQuery};
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Clone)]
pub struct GoalService {
    goals: GoalRepository,
}

impl GoalService {
    pub fn new(database: &Database) -> Self {
        Self {
            goals: database.goals(),
        }
    }

    pub async fn find_all(&self, language: Language) -> Result<Vec<GoalDto>, ServiceError> {
        Ok(self.goals.find_all_by_language(language).await?)
    }

    pub async fn get_shopping_list(
        &self,
        caller: &User,
        user_id: i64,
        language: Language,
    ) -> Result<Vec<ShoppingListDtoResponse>, ServiceError> {
        ensure_owner(caller, user_id)?;
        Ok(self.goals.shopping_list(user_id, language).await?)
    }

    /// Sets the status of one shopping-list entry, addressed by exactly one of the two goal ids.
    pub async fn update_shopping_list_status(
        &self,
        caller: &User,
        user_id: i64,
        goal_id: Option<i64>,
        custom_goal_id: Option<i64>,
        status: GoalStatus,
        now: DateTime<Utc>,
    ) -> Result<ShoppingListDtoResponse, ServiceError> {
        ensure_owner(caller, user_id)?;
        let goal = match (goal_id, custom_goal_id) {
            (Some(id), None) => GoalRef::Goal(id),
            (None, Some(id)) => GoalRef::Custom(id),
            _ => {
                return Err(ServiceError::BadRequest(
                    "exactly one of goalId and customGoalId is required".into(),
                ))
            }
        };

        let entry_id = self
            .goals
            .update_status(user_id, goal, status, now)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("user {user_id} has no shopping list entry for {goal:?}"))
            })?;
        info!(stage = "goal", user_id, entry_id, status = status.as_str(), "shopping list status updated");

        self.goals
            .shopping_list_entry(user_id, entry_id, Language::default())
            .await?
            .ok_or_else(|| ServiceError::not_found("shopping list entry", entry_id))
    }
}

fn ensure_owner(caller: &User, user_id: i64) -> Result<(), ServiceError> {
    if caller.id == user_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "user {} may not access the shopping list of user {user_id}",
            caller.id
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default)]
    goal_id: Option<i64>,
    #[serde(default)]
    custom_goal_id: Option<i64>,
    status: String,
}

pub async fn find_all(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LanguageQuery>,
) -> Result<Json<Vec<GoalDto>>, ProblemResponse> {
    let language = Language::resolve(query.lang.as_deref()).map_err(ServiceError::from)?;
    let service = GoalService::new(state.storage());
    Ok(Json(service.find_all(language).await?))
}

pub async fn shopping_list(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath((user_id, language_code)): ApiPath<(i64, String)>,
) -> Result<Json<Vec<ShoppingListDtoResponse>>, ProblemResponse> {
    let language = Language::resolve(Some(&language_code)).map_err(ServiceError::from)?;
    let service = GoalService::new(state.storage());
    Ok(Json(
        service
            .get_shopping_list(&caller, user_id, language)
            .await?,
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<ShoppingListDtoResponse>, ProblemResponse> {
    let status = query
        .status
        .parse::<GoalStatus>()
        .map_err(ServiceError::from)?;
    let service = GoalService::new(state.storage());
    let entry = service
        .update_shopping_list_status(
            &caller,
            user_id,
            query.goal_id,
            query.custom_goal_id,
            status,
            state.now(),
        )
        .await?;
    Ok(Json(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{empty_request, send, setup_state, AUTHOR, READER};

    async fn seed(state: &AppState) {
        for sql in [
            "INSERT INTO goals (id) VALUES (1), (2)",
            "INSERT INTO goal_translations (goal_id, language_code, text) VALUES \
             (1, 'en', 'Buy a bamboo brush'), (1, 'ua', 'Купити бамбукову щітку'), (2, 'en', 'Sort waste')",
            "INSERT INTO custom_goals (id, user_id, text) VALUES (1, 1, 'Bike to work')",
            "INSERT INTO user_goals (user_id, goal_id, custom_goal_id, status) VALUES \
             (1, 1, NULL, 'ACTIVE'), (1, NULL, 1, 'ACTIVE')",
        ] {
            sqlx::query(sql)
                .execute(state.storage().pool())
                .await
                .expect("seed");
        }
    }

    async fn caller(state: &AppState, id: i64) -> User {
        state
            .storage()
            .users()
            .find_by_id(id)
            .await
            .expect("query")
            .expect("user")
    }

    #[tokio::test]
    async fn status_update_requires_exactly_one_id() {
        let state = setup_state().await;
        seed(&state).await;
        let service = GoalService::new(state.storage());
        let author = caller(&state, AUTHOR).await;

        for (goal, custom) in [(None, None), (Some(1), Some(1))] {
            let err = service
                .update_shopping_list_status(&author, AUTHOR, goal, custom, GoalStatus::Done, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::BadRequest(_)));
        }

        let done = service
            .update_shopping_list_status(&author, AUTHOR, Some(1), None, GoalStatus::Done, Utc::now())
            .await
            .expect("update");
        assert_eq!(done.status, GoalStatus::Done);
        assert_eq!(done.text, "Buy a bamboo brush");

        let err = service
            .update_shopping_list_status(&author, AUTHOR, Some(2), None, GoalStatus::Done, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn other_users_cannot_touch_the_list() {
        let state = setup_state().await;
        seed(&state).await;
        let service = GoalService::new(state.storage());
        let reader = caller(&state, READER).await;

        let err = service
            .get_shopping_list(&reader, AUTHOR, Language::En)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn http_goals_default_to_english_and_validate_language() {
        let state = setup_state().await;
        seed(&state).await;

        let (status, goals) = send(&state, empty_request("GET", "/goals", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            goals,
            json!([
                { "id": 1, "text": "Buy a bamboo brush" },
                { "id": 2, "text": "Sort waste" }
            ])
        );

        let (status, _) = send(&state, empty_request("GET", "/goals?lang=de", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn http_shopping_list_flow() {
        let state = setup_state().await;
        seed(&state).await;

        let (status, list) = send(
            &state,
            empty_request("GET", "/goals/shoppingList/1/language/ua", Some(AUTHOR)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["text"], "Купити бамбукову щітку");
        assert_eq!(list[1]["text"], "Bike to work");

        let (status, entry) = send(
            &state,
            empty_request(
                "PATCH",
                "/goals/shoppingList/1?customGoalId=1&status=DONE",
                Some(AUTHOR),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["status"], "DONE");
        assert_eq!(entry["customGoalId"], 1);

        let (status, _) = send(
            &state,
            empty_request("GET", "/goals/shoppingList/1/language/en", Some(READER)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
