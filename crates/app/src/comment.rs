use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use tracing::info;

use greencity_core::comment::{check_can_delete, check_can_edit, check_reply_target, normalize_text};
use greencity_core::dto::{
    AddEcoNewsCommentDtoRequest, AddEcoNewsCommentDtoResponse, AmountCommentLikesDto,
    EcoNewsCommentAuthorDto, EcoNewsCommentDto,
};
use greencity_core::page::{PageRequest, PageableDto};
use greencity_core::types::{EcoNewsComment, User};
use greencity_storage::{
    CommentRepository, CommentScope, CommentViewRow, Database, EcoNewsRepository, LikeToggle,
    NewComment,
};

use crate::auth::{CurrentUser, OptionalUser};
use crate::error::ServiceError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::topic::LikeTopic;

/// Comment threads under eco-news items: one level of replies, soft delete, likes.
#[derive(Clone)]
pub struct CommentService {
    comments: CommentRepository,
    news: EcoNewsRepository,
    topic: LikeTopic,
}

impl CommentService {
    pub fn new(database: &Database, topic: LikeTopic) -> Self {
        Self {
            comments: database.comments(),
            news: database.eco_news(),
            topic,
        }
    }

    pub async fn save(
        &self,
        eco_news_id: i64,
        request: &AddEcoNewsCommentDtoRequest,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<AddEcoNewsCommentDtoResponse, ServiceError> {
        if !self.news.exists(eco_news_id).await? {
            return Err(ServiceError::not_found("eco news", eco_news_id));
        }
        let text = normalize_text(&request.text)?;
        if let Some(parent_id) = request.parent_comment_id {
            let parent = self.find_comment(parent_id).await?;
            check_reply_target(eco_news_id, &parent)?;
        }

        let comment = self
            .comments
            .insert(&NewComment {
                eco_news_id,
                parent_comment_id: request.parent_comment_id,
                author_id: user.id,
                text: &text,
                created_at: now,
            })
            .await?;

        counter!("comments_created_total").increment(1);
        info!(
            stage = "comment",
            id = comment.id,
            eco_news_id,
            parent = ?comment.parent_comment_id,
            author = user.id,
            "comment created"
        );
        Ok(AddEcoNewsCommentDtoResponse {
            id: comment.id,
            author: EcoNewsCommentAuthorDto {
                id: user.id,
                name: user.name.clone(),
            },
            text: comment.text,
            created_date: comment.created_date,
        })
    }

    pub async fn find_all_comments(
        &self,
        page: PageRequest,
        viewer: Option<i64>,
        eco_news_id: i64,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        self.top_level(page, viewer, eco_news_id, CommentScope::All)
            .await
    }

    pub async fn get_all_active_comments(
        &self,
        page: PageRequest,
        viewer: Option<i64>,
        eco_news_id: i64,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        self.top_level(page, viewer, eco_news_id, CommentScope::Active)
            .await
    }

    pub async fn find_all_replies(
        &self,
        page: PageRequest,
        parent_id: i64,
        viewer: Option<i64>,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        self.replies(page, parent_id, viewer, CommentScope::All)
            .await
    }

    pub async fn find_all_active_replies(
        &self,
        page: PageRequest,
        parent_id: i64,
        viewer: Option<i64>,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        self.replies(page, parent_id, viewer, CommentScope::Active)
            .await
    }

    /// Live comments on the news item, replies included.
    pub async fn count_of_comments(&self, eco_news_id: i64) -> Result<i64, ServiceError> {
        Ok(self.comments.count_active_for_news(eco_news_id).await?)
    }

    pub async fn count_replies(&self, parent_id: i64) -> Result<i64, ServiceError> {
        Ok(self
            .comments
            .count_replies(parent_id, CommentScope::Active)
            .await?)
    }

    /// Soft-deletes the comment together with its replies.
    pub async fn delete_by_id(&self, id: i64, user: &User) -> Result<(), ServiceError> {
        let comment = self.find_comment(id).await?;
        check_can_delete(user, &comment)?;
        let affected = self.comments.soft_delete_with_replies(id).await?;
        info!(stage = "comment", id, by = user.id, affected, "comment deleted");
        Ok(())
    }

    pub async fn update(
        &self,
        text: &str,
        id: i64,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let comment = self.find_comment(id).await?;
        check_can_edit(user, &comment)?;
        let text = normalize_text(text)?;
        if !self.comments.update_text(id, &text, now).await? {
            return Err(ServiceError::not_found("comment", id));
        }
        info!(stage = "comment", id, by = user.id, "comment edited");
        Ok(())
    }

    /// Toggles the caller's like and republishes the count. Returns whether the comment is now liked.
    pub async fn like(&self, id: i64, user: &User) -> Result<bool, ServiceError> {
        self.find_comment(id).await?;
        let toggle = self.comments.toggle_like(id, user.id).await?;
        let action = match toggle {
            LikeToggle::Added => "added",
            LikeToggle::Removed => "removed",
        };
        counter!("comment_likes_total", "action" => action).increment(1);
        self.publish_count(id).await?;
        Ok(toggle == LikeToggle::Added)
    }

    pub async fn count_likes(&self, id: i64) -> Result<i64, ServiceError> {
        self.find_comment(id).await?;
        Ok(self.comments.count_likes(id).await?)
    }

    /// Counts likes and pushes the result to topic subscribers.
    pub async fn publish_count(&self, id: i64) -> Result<AmountCommentLikesDto, ServiceError> {
        let amount = AmountCommentLikesDto {
            id,
            amount_likes: self.comments.count_likes(id).await?,
        };
        self.topic.publish(amount.clone());
        Ok(amount)
    }

    async fn find_comment(&self, id: i64) -> Result<EcoNewsComment, ServiceError> {
        self.comments
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("comment", id))
    }

    async fn top_level(
        &self,
        page: PageRequest,
        viewer: Option<i64>,
        eco_news_id: i64,
        scope: CommentScope,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        let rows = self
            .comments
            .list_top_level(eco_news_id, scope, page, viewer)
            .await?;
        let total = self.comments.count_top_level(eco_news_id, scope).await?;
        Ok(PageableDto::new(rows, total, page).map(to_comment_dto))
    }

    async fn replies(
        &self,
        page: PageRequest,
        parent_id: i64,
        viewer: Option<i64>,
        scope: CommentScope,
    ) -> Result<PageableDto<EcoNewsCommentDto>, ServiceError> {
        let rows = self
            .comments
            .list_replies(parent_id, scope, page, viewer)
            .await?;
        let total = self.comments.count_replies(parent_id, scope).await?;
        Ok(PageableDto::new(rows, total, page).map(to_comment_dto))
    }
}

fn to_comment_dto(row: CommentViewRow) -> EcoNewsCommentDto {
    let status = row.comment().status();
    EcoNewsCommentDto {
        id: row.id,
        author: EcoNewsCommentAuthorDto {
            id: row.author_id,
            name: row.author_name,
        },
        text: row.text,
        created_date: row.created_date,
        modified_date: row.modified_date,
        status,
        replies: row.replies,
        likes: row.likes,
        current_user_liked: row.current_user_liked,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPageQuery {
    eco_news_id: i64,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuery {
    id: i64,
    text: String,
}

fn service(state: &AppState) -> CommentService {
    CommentService::new(state.storage(), state.topic().clone())
}

pub async fn save(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(eco_news_id): ApiPath<i64>,
    ApiJson(request): ApiJson<AddEcoNewsCommentDtoRequest>,
) -> Result<(StatusCode, Json<AddEcoNewsCommentDtoResponse>), ProblemResponse> {
    let created = service(&state)
        .save(eco_news_id, &request, &user, state.now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn find_all(
    State(state): State<AppState>,
    viewer: OptionalUser,
    ApiQuery(query): ApiQuery<NewsPageQuery>,
) -> Result<Json<PageableDto<EcoNewsCommentDto>>, ProblemResponse> {
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let comments = service(&state)
        .find_all_comments(page, viewer.id(), query.eco_news_id)
        .await?;
    Ok(Json(comments))
}

pub async fn find_all_active(
    State(state): State<AppState>,
    viewer: OptionalUser,
    ApiQuery(query): ApiQuery<NewsPageQuery>,
) -> Result<Json<PageableDto<EcoNewsCommentDto>>, ProblemResponse> {
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let comments = service(&state)
        .get_all_active_comments(page, viewer.id(), query.eco_news_id)
        .await?;
    Ok(Json(comments))
}

pub async fn count_comments(
    State(state): State<AppState>,
    ApiPath(eco_news_id): ApiPath<i64>,
) -> Result<Json<i64>, ProblemResponse> {
    Ok(Json(service(&state).count_of_comments(eco_news_id).await?))
}

pub async fn find_all_replies(
    State(state): State<AppState>,
    viewer: OptionalUser,
    ApiPath(parent_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<PageableDto<EcoNewsCommentDto>>, ProblemResponse> {
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let replies = service(&state)
        .find_all_replies(page, parent_id, viewer.id())
        .await?;
    Ok(Json(replies))
}

pub async fn find_all_active_replies(
    State(state): State<AppState>,
    viewer: OptionalUser,
    ApiPath(parent_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<PageableDto<EcoNewsCommentDto>>, ProblemResponse> {
    let page = PageRequest::new(query.page, query.size).map_err(ServiceError::from)?;
    let replies = service(&state)
        .find_all_active_replies(page, parent_id, viewer.id())
        .await?;
    Ok(Json(replies))
}

pub async fn count_replies(
    State(state): State<AppState>,
    ApiPath(parent_id): ApiPath<i64>,
) -> Result<Json<i64>, ProblemResponse> {
    Ok(Json(service(&state).count_replies(parent_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<StatusCode, ProblemResponse> {
    service(&state).delete_by_id(query.id, &user).await?;
    Ok(StatusCode::OK)
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<UpdateQuery>,
) -> Result<StatusCode, ProblemResponse> {
    service(&state)
        .update(&query.text, query.id, &user, state.now())
        .await?;
    Ok(StatusCode::OK)
}

pub async fn like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<Json<bool>, ProblemResponse> {
    Ok(Json(service(&state).like(query.id, &user).await?))
}

pub async fn count_likes(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<Json<i64>, ProblemResponse> {
    Ok(Json(service(&state).count_likes(query.id).await?))
}

pub async fn like_and_count(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<Json<AmountCommentLikesDto>, ProblemResponse> {
    let service = service(&state);
    service.count_likes(query.id).await?;
    Ok(Json(service.publish_count(query.id).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone};
    use greencity_core::types::CommentStatus;
    use serde_json::json;

    use super::*;
    use crate::router::Clock;
    use crate::test_support::{
        empty_request, json_request, send, setup_state, ADMIN, AUTHOR, MODERATOR, READER,
    };

    async fn user(state: &AppState, id: i64) -> User {
        state
            .storage()
            .users()
            .find_by_id(id)
            .await
            .expect("query")
            .expect("user")
    }

    fn request(text: &str, parent: Option<i64>) -> AddEcoNewsCommentDtoRequest {
        AddEcoNewsCommentDtoRequest {
            text: text.to_string(),
            parent_comment_id: parent,
        }
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[tokio::test]
    async fn save_trims_text_and_checks_news() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;

        let saved = service
            .save(1, &request("  hello  ", None), &author, at(0))
            .await
            .expect("save");
        assert_eq!(saved.text, "hello");
        assert_eq!(saved.author.name, "Author");
        assert_eq!(saved.created_date, at(0));

        let err = service
            .save(42, &request("hello", None), &author, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = service
            .save(1, &request("   ", None), &author, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = service
            .save(1, &request(&"x".repeat(8001), None), &author, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn reply_rules_are_enforced() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;

        let parent = service
            .save(1, &request("parent", None), &author, at(0))
            .await
            .expect("parent");
        let reply = service
            .save(1, &request("reply", Some(parent.id)), &author, at(1))
            .await
            .expect("reply");

        let err = service
            .save(1, &request("nested", Some(reply.id)), &author, at(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = service
            .save(2, &request("elsewhere", Some(parent.id)), &author, at(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = service
            .save(1, &request("ghost", Some(999)), &author, at(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        service.delete_by_id(parent.id, &author).await.expect("delete");
        let err = service
            .save(1, &request("late", Some(parent.id)), &author, at(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn soft_delete_cascades_and_counts_follow() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;
        let reader = user(&state, READER).await;

        let parent = service
            .save(1, &request("parent", None), &author, at(0))
            .await
            .expect("parent");
        for minute in 1..=2 {
            service
                .save(1, &request("reply", Some(parent.id)), &reader, at(minute))
                .await
                .expect("reply");
        }
        service
            .save(1, &request("other", None), &reader, at(3))
            .await
            .expect("other");
        assert_eq!(service.count_of_comments(1).await.expect("count"), 4);
        assert_eq!(service.count_replies(parent.id).await.expect("replies"), 2);

        let err = service.delete_by_id(parent.id, &reader).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        service.delete_by_id(parent.id, &author).await.expect("delete");
        assert_eq!(service.count_of_comments(1).await.expect("count"), 1);
        assert_eq!(service.count_replies(parent.id).await.expect("replies"), 0);

        let all = service
            .find_all_comments(PageRequest::default(), None, 1)
            .await
            .expect("all");
        assert_eq!(all.total_elements, 2);
        let deleted = all
            .page
            .iter()
            .find(|comment| comment.id == parent.id)
            .expect("deleted comment still listed");
        assert_eq!(deleted.status, CommentStatus::Deleted);

        let active = service
            .get_all_active_comments(PageRequest::default(), None, 1)
            .await
            .expect("active");
        assert_eq!(active.total_elements, 1);

        let replies = service
            .find_all_replies(PageRequest::default(), parent.id, None)
            .await
            .expect("replies");
        assert_eq!(replies.total_elements, 2);
        let active_replies = service
            .find_all_active_replies(PageRequest::default(), parent.id, None)
            .await
            .expect("active replies");
        assert_eq!(active_replies.total_elements, 0);
    }

    #[tokio::test]
    async fn moderators_may_delete_others_comments() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;

        let first = service
            .save(1, &request("first", None), &author, at(0))
            .await
            .expect("first");
        let second = service
            .save(1, &request("second", None), &author, at(1))
            .await
            .expect("second");

        service
            .delete_by_id(first.id, &user(&state, MODERATOR).await)
            .await
            .expect("moderator");
        service
            .delete_by_id(second.id, &user(&state, ADMIN).await)
            .await
            .expect("admin");
        let err = service.delete_by_id(77, &author).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_orders_and_pages() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;

        let mut ids = Vec::new();
        for minute in 0..5 {
            let saved = service
                .save(1, &request(&format!("c{minute}"), None), &author, at(minute))
                .await
                .expect("save");
            ids.push(saved.id);
        }

        let page = PageRequest::new(Some(0), Some(2)).expect("page");
        let first = service.find_all_comments(page, None, 1).await.expect("page");
        assert_eq!(first.total_elements, 5);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.current_page, 0);
        assert_eq!(
            first.page.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![ids[4], ids[3]]
        );

        let last = PageRequest::new(Some(2), Some(2)).expect("page");
        let last = service.find_all_comments(last, None, 1).await.expect("page");
        assert_eq!(last.page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ids[0]]);
    }

    #[tokio::test]
    async fn only_the_author_edits_live_comments() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;
        let admin = user(&state, ADMIN).await;

        let saved = service
            .save(1, &request("draft", None), &author, at(0))
            .await
            .expect("save");

        let err = service.update("hijack", saved.id, &admin, at(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        service
            .update(" final ", saved.id, &author, at(5))
            .await
            .expect("edit");
        let listed = service
            .find_all_comments(PageRequest::default(), None, 1)
            .await
            .expect("list");
        assert_eq!(listed.page[0].text, "final");
        assert_eq!(listed.page[0].status, CommentStatus::Edited);
        assert_eq!(listed.page[0].modified_date, at(5));

        service.delete_by_id(saved.id, &author).await.expect("delete");
        let err = service.update("again", saved.id, &author, at(6)).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn like_toggles_and_publishes() {
        let state = setup_state().await;
        let service = service(&state);
        let author = user(&state, AUTHOR).await;
        let reader = user(&state, READER).await;
        let mut receiver = state.topic().subscribe();

        let saved = service
            .save(1, &request("likeable", None), &author, at(0))
            .await
            .expect("save");

        assert!(service.like(saved.id, &reader).await.expect("like"));
        assert_eq!(service.count_likes(saved.id).await.expect("count"), 1);
        let published = receiver.recv().await.expect("published");
        assert_eq!(published.amount_likes, 1);

        let listed = service
            .find_all_comments(PageRequest::default(), Some(reader.id), 1)
            .await
            .expect("list");
        assert!(listed.page[0].current_user_liked);
        assert_eq!(listed.page[0].likes, 1);

        assert!(!service.like(saved.id, &reader).await.expect("unlike"));
        assert_eq!(service.count_likes(saved.id).await.expect("count"), 0);
        let published = receiver.recv().await.expect("published");
        assert_eq!(published.amount_likes, 0);

        let err = service.like(404, &reader).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn http_flow_uses_clock_and_query_parameters() {
        let now = Arc::new(Mutex::new(at(0)));
        let clock_source = now.clone();
        let clock: Clock = Arc::new(move || *clock_source.lock().unwrap());
        let state = setup_state().await.with_clock(clock);

        let (status, created) = send(
            &state,
            json_request("POST", "/econews/comments/1", &json!({ "text": "Nice" }), Some(AUTHOR)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["createdDate"], "2024-05-01T10:00:00Z");
        let id = created["id"].as_i64().expect("id");

        *now.lock().unwrap() = at(10);
        let query = serde_urlencoded::to_string([("id", id.to_string()), ("text", "Nice & green".into())])
            .expect("query");
        let (status, _) = send(
            &state,
            empty_request("PATCH", &format!("/econews/comments?{query}"), Some(AUTHOR)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, listed) =
            send(&state, empty_request("GET", "/econews/comments?ecoNewsId=1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["totalElements"], 1);
        assert_eq!(listed["page"][0]["text"], "Nice & green");
        assert_eq!(listed["page"][0]["status"], "EDITED");
        assert_eq!(listed["page"][0]["author"]["name"], "Author");

        let (status, count) = send(
            &state,
            empty_request("POST", &format!("/econews/comments/likeAndCount?id={id}"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count, json!({ "id": id, "amountLikes": 0 }));
    }

    #[tokio::test]
    async fn http_rejects_bad_page_sizes_and_anonymous_writes() {
        let state = setup_state().await;

        for size in [0, 101] {
            let (status, body) = send(
                &state,
                empty_request("GET", &format!("/econews/comments?ecoNewsId=1&size={size}"), None),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["type"], "bad_request");
        }

        let (status, _) = send(
            &state,
            json_request("POST", "/econews/comments/1", &json!({ "text": "hi" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, count) = send(
            &state,
            empty_request("GET", "/econews/comments/count/comments/1", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count, 0);
    }
}
