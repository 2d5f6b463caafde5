use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{sse::Sse, IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use greencity_core::token::TokenStore;
use greencity_storage::Database;

use crate::auth::JwtValidator;
use crate::topic::{topic_keep_alive, topic_stream, LikeTopic};
use crate::{category, comment, goal, habit, management, place, telemetry};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    tokens: TokenStore,
    topic: LikeTopic,
    jwt: JwtValidator,
    clock: Clock,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        tokens: TokenStore,
        jwt_secret: &[u8],
    ) -> Self {
        Self {
            metrics,
            storage,
            tokens,
            topic: LikeTopic::new(),
            jwt: JwtValidator::new(jwt_secret),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn topic(&self) -> &LikeTopic {
        &self.topic
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/topic/comment", get(comment_topic))
        .merge(comment_routes())
        .merge(goal_routes())
        .merge(place_routes())
        .merge(category_routes())
        .merge(habit_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            management::inject_access_token,
        ))
        .with_state(state)
}

fn comment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/econews/comments",
            get(comment::find_all)
                .delete(comment::delete)
                .patch(comment::update),
        )
        .route("/econews/comments/:eco_news_id", post(comment::save))
        .route("/econews/comments/active", get(comment::find_all_active))
        .route(
            "/econews/comments/count/comments/:eco_news_id",
            get(comment::count_comments),
        )
        .route(
            "/econews/comments/replies/:parent_comment_id",
            get(comment::find_all_replies),
        )
        .route(
            "/econews/comments/replies/active/:parent_comment_id",
            get(comment::find_all_active_replies),
        )
        .route(
            "/econews/comments/count/replies/:parent_comment_id",
            get(comment::count_replies),
        )
        .route("/econews/comments/like", post(comment::like))
        .route("/econews/comments/count/likes", get(comment::count_likes))
        .route("/econews/comments/likeAndCount", post(comment::like_and_count))
}

fn goal_routes() -> Router<AppState> {
    Router::new()
        .route("/goals", get(goal::find_all))
        .route(
            "/goals/shoppingList/:user_id/language/:language_code",
            get(goal::shopping_list),
        )
        .route("/goals/shoppingList/:user_id", patch(goal::update_status))
}

fn place_routes() -> Router<AppState> {
    Router::new()
        .route("/place/propose", post(place::propose))
        .route("/place/info/:id", get(place::info))
        .route(
            "/place/getListPlaceLocationByMapsBounds",
            post(place::by_map_bounds),
        )
        .route("/management/places", get(place::by_status))
        .route("/management/places/status", patch(place::update_status))
        .route("/management/places/:id", delete(place::delete))
}

fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(category::find_all_dto))
        .route("/categories/:id", get(category::find_by_id))
        .route(
            "/management/categories",
            get(category::find_all).post(category::save),
        )
        .route(
            "/management/categories/:id",
            put(category::update).delete(category::delete),
        )
}

fn habit_routes() -> Router<AppState> {
    Router::new()
        .route("/habit", get(habit::find_all))
        .route("/habit/tags/search", get(habit::find_by_tags))
        .route("/habit/assigned/:user_id", get(habit::assigned))
        .route("/habit/:id", get(habit::find_by_id))
        .route("/management/habits/:id", delete(habit::delete))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

async fn comment_topic(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, serde_json::Error>>> {
    let stream = topic_stream(state.topic().clone());
    Sse::new(stream).keep_alive(topic_keep_alive())
}
