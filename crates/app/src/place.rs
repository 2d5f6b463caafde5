use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use tracing::info;

use greencity_core::dto::{
    AdminPlaceDto, MapBoundsDto, PlaceAddDto, PlaceByBoundsDto, PlaceInfoDto, UpdatePlaceStatusDto,
};
use greencity_core::place::{
    plan_status_transition, validate_location, validate_opening_hours, PlaceRuleError,
};
use greencity_core::types::{Place, PlaceStatus, User};
use greencity_storage::{Database, NewPlace, PlaceRepository};

use crate::auth::{CurrentUser, Moderator};
use crate::category::CategoryService;
use crate::error::ServiceError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Clone)]
pub struct PlaceService {
    places: PlaceRepository,
    categories: CategoryService,
}

impl PlaceService {
    pub fn new(database: &Database) -> Self {
        Self {
            places: database.places(),
            categories: CategoryService::new(database),
        }
    }

    /// Moves a place to `requested`. Re-applying the current status is refused.
    pub async fn update_status(
        &self,
        id: i64,
        requested: PlaceStatus,
        now: DateTime<Utc>,
    ) -> Result<UpdatePlaceStatusDto, ServiceError> {
        let place = self.find_by_id(id).await?;
        let status = plan_status_transition(place.id, place.status, requested)?;
        if !self.places.update_status(place.id, status, now).await? {
            return Err(ServiceError::not_found("place", id));
        }
        counter!("place_status_transitions_total", "status" => status.as_str()).increment(1);
        info!(
            stage = "place",
            id,
            from = ?place.status,
            to = status.as_str(),
            "place status updated"
        );
        Ok(UpdatePlaceStatusDto { id, status })
    }

    /// Creates a `PROPOSED` place with its category, location and opening hours in one transaction.
    pub async fn propose(
        &self,
        dto: &PlaceAddDto,
        author: &User,
        now: DateTime<Utc>,
    ) -> Result<PlaceInfoDto, ServiceError> {
        let name = dto.name.trim();
        if name.is_empty() {
            return Err(PlaceRuleError::BlankName.into());
        }
        if dto.category.name.trim().is_empty() {
            return Err(PlaceRuleError::BlankCategory.into());
        }
        validate_location(&dto.location)?;
        validate_opening_hours(&dto.opening_hours_list)?;

        let (lat, lng) = (dto.location.lat, dto.location.lng);
        if let Some(existing) = self.places.find_id_by_location(lat, lng).await? {
            return Err(ServiceError::BadRequest(format!(
                "place {existing} already occupies lat {lat}, lng {lng}"
            )));
        }

        let mut tx = self.places.begin().await?;
        let category = self.categories.find_or_create(&mut tx, &dto.category).await?;
        let place = NewPlace {
            name,
            category_id: category.id,
            author_id: author.id,
            status: PlaceStatus::Proposed,
            modified_date: now,
        };
        let id = self.places.insert(&mut tx, &place).await?;
        self.places.insert_location(&mut tx, id, &dto.location).await?;
        for hours in &dto.opening_hours_list {
            self.places.insert_opening_hours(&mut tx, id, hours).await?;
        }
        tx.commit().await?;

        info!(stage = "place", id, author = author.id, category = %category.name, "place proposed");
        self.get_info_by_id(id).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Place, ServiceError> {
        self.places
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("place", id))
    }

    pub async fn get_info_by_id(&self, id: i64) -> Result<PlaceInfoDto, ServiceError> {
        let row = self
            .places
            .find_info(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("place", id))?;
        let opening_hours = self.places.opening_hours(id).await?;
        let rate = self.average_rate(id).await?;
        Ok(PlaceInfoDto {
            id: row.id,
            status: row.status()?,
            location: row.location(),
            name: row.name,
            category: row.category_name,
            opening_hours,
            rate,
        })
    }

    /// Admin listing. Without a status nothing is returned.
    pub async fn get_places_by_status(
        &self,
        status: Option<PlaceStatus>,
    ) -> Result<Vec<AdminPlaceDto>, ServiceError> {
        match status {
            Some(status) => Ok(self.places.find_by_status(status).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn find_places_by_map_bounds(
        &self,
        bounds: &MapBoundsDto,
    ) -> Result<Vec<PlaceByBoundsDto>, ServiceError> {
        bounds.validate()?;
        Ok(self
            .places
            .find_in_bounds(bounds, PlaceStatus::Approved)
            .await?)
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<bool, ServiceError> {
        if !self.places.delete(id).await? {
            return Err(ServiceError::not_found("place", id));
        }
        info!(stage = "place", id, "place deleted");
        Ok(true)
    }

    pub async fn exists_by_id(&self, id: i64) -> Result<bool, ServiceError> {
        Ok(self.places.exists(id).await?)
    }

    pub async fn average_rate(&self, id: i64) -> Result<Option<f64>, ServiceError> {
        if !self.exists_by_id(id).await? {
            return Err(ServiceError::not_found("place", id));
        }
        Ok(self.places.average_rate(id).await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    status: Option<String>,
}

/// Body of a status change. Fields are optional so each missing one is named in the problem.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    status: Option<PlaceStatus>,
}

pub async fn propose(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(dto): ApiJson<PlaceAddDto>,
) -> Result<(StatusCode, Json<PlaceInfoDto>), ProblemResponse> {
    let service = PlaceService::new(state.storage());
    let place = service.propose(&dto, &user, state.now()).await?;
    Ok((StatusCode::CREATED, Json(place)))
}

pub async fn info(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PlaceInfoDto>, ProblemResponse> {
    let service = PlaceService::new(state.storage());
    Ok(Json(service.get_info_by_id(id).await?))
}

pub async fn by_map_bounds(
    State(state): State<AppState>,
    ApiJson(bounds): ApiJson<MapBoundsDto>,
) -> Result<Json<Vec<PlaceByBoundsDto>>, ProblemResponse> {
    let service = PlaceService::new(state.storage());
    Ok(Json(service.find_places_by_map_bounds(&bounds).await?))
}

pub async fn by_status(
    State(state): State<AppState>,
    _moderator: Moderator,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<Vec<AdminPlaceDto>>, ProblemResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PlaceStatus>)
        .transpose()
        .map_err(ServiceError::from)?;
    let service = PlaceService::new(state.storage());
    Ok(Json(service.get_places_by_status(status).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiJson(body): ApiJson<UpdateStatusBody>,
) -> Result<Json<UpdatePlaceStatusDto>, ProblemResponse> {
    let id = body
        .id
        .ok_or_else(|| ServiceError::BadRequest("place id is required".into()))?;
    let status = body
        .status
        .ok_or_else(|| ServiceError::BadRequest("status is required".into()))?;
    let service = PlaceService::new(state.storage());
    let updated = service.update_status(id, status, state.now()).await?;
    info!(stage = "management", moderator = moderator.id(), id, "place status changed");
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    moderator: Moderator,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<bool>, ProblemResponse> {
    let service = PlaceService::new(state.storage());
    let deleted = service.delete_by_id(id).await?;
    info!(stage = "management", moderator = moderator.id(), id, "place deleted");
    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use greencity_core::dto::{CategoryDto, LocationAddressAndGeoDto, OpeningHoursDto};
    use greencity_core::types::WeekDay;
    use serde_json::json;

    use crate::test_support::{
        empty_request, json_request, send, setup_management_state, setup_state, ADMIN, AUTHOR,
        MODERATOR,
    };

    fn t(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).expect("time")
    }

    fn add_dto(name: &str, lat: f64, lng: f64) -> PlaceAddDto {
        PlaceAddDto {
            name: name.to_string(),
            category: CategoryDto {
                name: "Cafe".to_string(),
                parent_category_id: None,
            },
            location: LocationAddressAndGeoDto {
                address: "Main street 1".to_string(),
                lat,
                lng,
            },
            opening_hours_list: vec![OpeningHoursDto {
                week_day: WeekDay::Monday,
                open_time: t(9),
                close_time: t(18),
            }],
        }
    }

    async fn author(state: &AppState) -> User {
        state
            .storage()
            .users()
            .find_by_id(AUTHOR)
            .await
            .expect("query")
            .expect("author")
    }

    #[tokio::test]
    async fn status_update_to_same_status_is_refused() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        let place = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, Utc::now())
            .await
            .expect("propose");

        let approved = service
            .update_status(place.id, PlaceStatus::Approved, Utc::now())
            .await
            .expect("approve");
        assert_eq!(approved.status, PlaceStatus::Approved);

        let err = service
            .update_status(place.id, PlaceStatus::Approved, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::StatusUnchanged(_)));

        let err = service
            .update_status(999, PlaceStatus::Approved, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_update_stamps_modified_date() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let place = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, created_at)
            .await
            .expect("propose");

        let later = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        service
            .update_status(place.id, PlaceStatus::Declined, later)
            .await
            .expect("decline");
        let stored = service.find_by_id(place.id).await.expect("place");
        assert_eq!(stored.status, Some(PlaceStatus::Declined));
        assert_eq!(stored.modified_date, later);
    }

    #[tokio::test]
    async fn place_without_status_cannot_transition() {
        let state = setup_state().await;
        sqlx::query("INSERT INTO categories (id, name) VALUES (1, 'Legacy')")
            .execute(state.storage().pool())
            .await
            .expect("category");
        sqlx::query(
            "INSERT INTO places (id, name, category_id, author_id, status, modified_date) \
             VALUES (5, 'Old', 1, 1, NULL, '2024-01-01T00:00:00.000Z')",
        )
        .execute(state.storage().pool())
        .await
        .expect("place");

        let err = PlaceService::new(state.storage())
            .update_status(5, PlaceStatus::Approved, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn propose_reuses_categories_and_rejects_taken_locations() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;

        let first = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, Utc::now())
            .await
            .expect("first");
        assert_eq!(first.status, Some(PlaceStatus::Proposed));
        assert_eq!(first.category, "Cafe");
        assert_eq!(first.opening_hours.len(), 1);
        assert_eq!(first.rate, None);

        let second = service
            .propose(&add_dto("Zero waste", 49.85, 24.04), &user, Utc::now())
            .await
            .expect("second");
        assert_eq!(second.category, "Cafe");
        let categories = CategoryService::new(state.storage())
            .find_all()
            .await
            .expect("categories");
        assert_eq!(categories.len(), 1);

        let err = service
            .propose(&add_dto("Copy", 49.84, 24.03), &user, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn failed_proposal_leaves_no_new_category() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let ghost = User {
            id: 999,
            ..author(&state).await
        };

        let result = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &ghost, Utc::now())
            .await;
        assert!(result.is_err());

        let categories = CategoryService::new(state.storage())
            .find_by_name("Cafe")
            .await
            .expect("query");
        assert!(categories.is_none());
    }

    #[tokio::test]
    async fn propose_validates_opening_hours() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;

        let mut dto = add_dto("Late shop", 49.84, 24.03);
        dto.opening_hours_list[0].open_time = t(20);
        let err = service.propose(&dto, &user, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert!(!service.exists_by_id(1).await.expect("exists"));
    }

    #[tokio::test]
    async fn info_reports_average_rate() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        let place = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, Utc::now())
            .await
            .expect("propose");
        sqlx::query("INSERT INTO rates (place_id, user_id, rate) VALUES (?, 1, 4), (?, 2, 5)")
            .bind(place.id)
            .bind(place.id)
            .execute(state.storage().pool())
            .await
            .expect("rates");

        let info = service.get_info_by_id(place.id).await.expect("info");
        assert_eq!(info.rate, Some(4.5));
        assert_eq!(service.average_rate(place.id).await.expect("rate"), Some(4.5));
    }

    #[tokio::test]
    async fn map_bounds_only_return_approved_places_inside() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        let inside = service
            .propose(&add_dto("Inside", 10.0, 10.0), &user, Utc::now())
            .await
            .expect("inside");
        let edge = service
            .propose(&add_dto("Edge", 20.0, 20.0), &user, Utc::now())
            .await
            .expect("edge");
        let outside = service
            .propose(&add_dto("Outside", 30.0, 30.0), &user, Utc::now())
            .await
            .expect("outside");
        service
            .propose(&add_dto("Pending", 15.0, 15.0), &user, Utc::now())
            .await
            .expect("pending");
        for id in [inside.id, edge.id, outside.id] {
            service
                .update_status(id, PlaceStatus::Approved, Utc::now())
                .await
                .expect("approve");
        }

        let bounds = MapBoundsDto {
            north_east_lat: 20.0,
            north_east_lng: 20.0,
            south_west_lat: 0.0,
            south_west_lng: 0.0,
        };
        let found = service.find_places_by_map_bounds(&bounds).await.expect("bounds");
        let ids: Vec<i64> = found.iter().map(|place| place.id).collect();
        assert_eq!(ids, vec![inside.id, edge.id]);
    }

    #[tokio::test]
    async fn listing_without_status_is_empty() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, Utc::now())
            .await
            .expect("propose");

        assert!(service.get_places_by_status(None).await.expect("none").is_empty());
        let proposed = service
            .get_places_by_status(Some(PlaceStatus::Proposed))
            .await
            .expect("proposed");
        assert_eq!(proposed.len(), 1);
        assert_eq!(proposed[0].author_id, AUTHOR);
    }

    #[tokio::test]
    async fn delete_removes_place_and_reports_missing() {
        let state = setup_state().await;
        let service = PlaceService::new(state.storage());
        let user = author(&state).await;
        let place = service
            .propose(&add_dto("Eco shop", 49.84, 24.03), &user, Utc::now())
            .await
            .expect("propose");

        assert!(service.delete_by_id(place.id).await.expect("delete"));
        assert!(!service.exists_by_id(place.id).await.expect("exists"));
        let err = service.delete_by_id(place.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn management_status_endpoint_round_trip() {
        let state = setup_management_state(MODERATOR).await;
        let body = json!({
            "name": "Eco shop",
            "category": { "name": "Cafe" },
            "location": { "address": "Main street 1", "lat": 49.84, "lng": 24.03 },
            "openingHoursList": [
                { "weekDay": "MONDAY", "openTime": "09:00:00", "closeTime": "18:00:00" }
            ]
        });
        let (status, created) =
            send(&state, json_request("POST", "/place/propose", &body, Some(AUTHOR))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().expect("id");

        let (status, listed) =
            send(&state, empty_request("GET", "/management/places?status=proposed", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["id"], id);

        let change = json!({ "id": id, "status": "APPROVED" });
        let (status, updated) = send(
            &state,
            json_request("PATCH", "/management/places/status", &change, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated, json!({ "id": id, "status": "APPROVED" }));

        let (status, problem) = send(
            &state,
            json_request("PATCH", "/management/places/status", &change, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(problem["type"], "status_unchanged");

        let (status, _) = send(
            &state,
            json_request("PATCH", "/management/places/status", &json!({ "status": "DECLINED" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn proposing_requires_authentication() {
        let state = setup_state().await;
        let body = serde_json::to_value(add_dto("Eco shop", 49.84, 24.03)).expect("body");
        let (status, _) = send(&state, json_request("POST", "/place/propose", &body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(&state, json_request("POST", "/place/propose", &body, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
