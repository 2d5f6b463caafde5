//! Transfer objects exchanged with HTTP clients. Field names are camelCase on the wire.
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentStatus, GoalStatus, PlaceStatus, WeekDay};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub name: String,
    #[serde(default)]
    pub parent_category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAddressAndGeoDto {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHoursDto {
    pub week_day: WeekDay,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceAddDto {
    pub name: String,
    pub category: CategoryDto,
    pub location: LocationAddressAndGeoDto,
    #[serde(default)]
    pub opening_hours_list: Vec<OpeningHoursDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceInfoDto {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub status: Option<PlaceStatus>,
    pub location: Option<LocationAddressAndGeoDto>,
    pub opening_hours: Vec<OpeningHoursDto>,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPlaceDto {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub author_id: i64,
    pub status: Option<PlaceStatus>,
    pub modified_date: DateTime<Utc>,
    pub location: Option<LocationAddressAndGeoDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceByBoundsDto {
    pub id: i64,
    pub name: String,
    pub location: LocationAddressAndGeoDto,
}

/// Status change request, also used as the response of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlaceStatusDto {
    pub id: i64,
    pub status: PlaceStatus,
}

/// Rectangle on the map described by its north-east and south-west corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBoundsDto {
    pub north_east_lat: f64,
    pub north_east_lng: f64,
    pub south_west_lat: f64,
    pub south_west_lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEcoNewsCommentDtoRequest {
    pub text: String,
    #[serde(default)]
    pub parent_comment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoNewsCommentAuthorDto {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEcoNewsCommentDtoResponse {
    pub id: i64,
    pub author: EcoNewsCommentAuthorDto,
    pub text: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoNewsCommentDto {
    pub id: i64,
    pub author: EcoNewsCommentAuthorDto,
    pub text: String,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub status: CommentStatus,
    pub replies: i64,
    pub likes: i64,
    pub current_user_liked: bool,
}

/// Payload republished on the comment topic after likes change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountCommentLikesDto {
    pub id: i64,
    pub amount_likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDto {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListDtoResponse {
    pub id: i64,
    pub goal_id: Option<i64>,
    pub custom_goal_id: Option<i64>,
    pub text: String,
    pub status: GoalStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitTranslationDto {
    pub id: i64,
    pub habit_id: i64,
    pub language_code: String,
    pub name: String,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn place_add_dto_reads_camel_case_payload() {
        let dto: PlaceAddDto = serde_json::from_value(json!({
            "name": "Eco shop",
            "category": {"name": "Shops"},
            "location": {"address": "Main st. 1", "lat": 49.84, "lng": 24.03},
            "openingHoursList": [
                {"weekDay": "MONDAY", "openTime": "10:30:00", "closeTime": "20:30:00"}
            ]
        }))
        .expect("payload should deserialize");

        assert_eq!(dto.category.parent_category_id, None);
        assert_eq!(dto.opening_hours_list.len(), 1);
        assert_eq!(dto.opening_hours_list[0].week_day, WeekDay::Monday);
    }

    #[test]
    fn like_amount_uses_wire_names() {
        let value = serde_json::to_value(AmountCommentLikesDto {
            id: 7,
            amount_likes: 3,
        })
        .expect("serialize");
        assert_eq!(value, json!({"id": 7, "amountLikes": 3}));
    }
}
