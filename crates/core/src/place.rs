use std::collections::HashSet;

use thiserror::Error;

use crate::dto::{LocationAddressAndGeoDto, MapBoundsDto, OpeningHoursDto};
use crate::types::PlaceStatus;

/// Reasons a status transition is refused before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusTransitionError {
    #[error("place {place_id} already has status {status}")]
    Unchanged { place_id: i64, status: PlaceStatus },
    #[error("place {place_id} has no current status")]
    MissingCurrentStatus { place_id: i64 },
}

/// Decides the status a place moves to. The requested status must differ from the stored one.
pub fn plan_status_transition(
    place_id: i64,
    current: Option<PlaceStatus>,
    requested: PlaceStatus,
) -> Result<PlaceStatus, StatusTransitionError> {
    let Some(current) = current else {
        return Err(StatusTransitionError::MissingCurrentStatus { place_id });
    };
    if current == requested {
        return Err(StatusTransitionError::Unchanged {
            place_id,
            status: current,
        });
    }
    Ok(requested)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaceRuleError {
    #[error("place name must not be blank")]
    BlankName,
    #[error("category name must not be blank")]
    BlankCategory,
    #[error("coordinates out of range: lat {lat}, lng {lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("opening time must be before closing time on {0}")]
    InvalidOpeningHours(&'static str),
    #[error("opening hours listed twice for {0}")]
    DuplicateWeekDay(&'static str),
    #[error("map bounds are inverted")]
    InvertedBounds,
}

pub fn validate_location(location: &LocationAddressAndGeoDto) -> Result<(), PlaceRuleError> {
    let valid = (-90.0..=90.0).contains(&location.lat) && (-180.0..=180.0).contains(&location.lng);
    if valid {
        Ok(())
    } else {
        Err(PlaceRuleError::InvalidCoordinates {
            lat: location.lat,
            lng: location.lng,
        })
    }
}

pub fn validate_opening_hours(hours: &[OpeningHoursDto]) -> Result<(), PlaceRuleError> {
    let mut seen = HashSet::new();
    for entry in hours {
        if entry.open_time >= entry.close_time {
            return Err(PlaceRuleError::InvalidOpeningHours(entry.week_day.as_str()));
        }
        if !seen.insert(entry.week_day) {
            return Err(PlaceRuleError::DuplicateWeekDay(entry.week_day.as_str()));
        }
    }
    Ok(())
}

impl MapBoundsDto {
    pub fn validate(&self) -> Result<(), PlaceRuleError> {
        if self.north_east_lat < self.south_west_lat || self.north_east_lng < self.south_west_lng {
            return Err(PlaceRuleError::InvertedBounds);
        }
        Ok(())
    }

    /// Inclusive containment check.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.south_west_lat..=self.north_east_lat).contains(&lat)
            && (self.south_west_lng..=self.north_east_lng).contains(&lng)
    }
}
