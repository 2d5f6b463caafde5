use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use greencity_core::dto::{
    AdminPlaceDto, LocationAddressAndGeoDto, MapBoundsDto, OpeningHoursDto, PlaceByBoundsDto,
};
use greencity_core::types::{Place, PlaceStatus, WeekDay};

use crate::{is_unique_violation, to_rfc3339};

#[derive(Debug, sqlx::FromRow)]
struct PlaceRow {
    id: i64,
    name: String,
    category_id: i64,
    author_id: i64,
    status: Option<String>,
    modified_date: DateTime<Utc>,
}

impl PlaceRow {
    fn into_domain(self) -> Result<Place, PlaceError> {
        Ok(Place {
            id: self.id,
            name: self.name,
            category_id: self.category_id,
            author_id: self.author_id,
            status: parse_status(self.status)?,
            modified_date: self.modified_date,
        })
    }
}

/// Place joined with its category name and optional location.
#[derive(Debug, sqlx::FromRow)]
pub struct PlaceInfoRow {
    pub id: i64,
    pub name: String,
    pub category_name: String,
    pub author_id: i64,
    pub status: Option<String>,
    pub modified_date: DateTime<Utc>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl PlaceInfoRow {
    pub fn status(&self) -> Result<Option<PlaceStatus>, PlaceError> {
        parse_status(self.status.clone())
    }

    pub fn location(&self) -> Option<LocationAddressAndGeoDto> {
        match (&self.address, self.lat, self.lng) {
            (Some(address), Some(lat), Some(lng)) => Some(LocationAddressAndGeoDto {
                address: address.clone(),
                lat,
                lng,
            }),
            _ => None,
        }
    }

    pub fn into_admin_dto(self) -> Result<AdminPlaceDto, PlaceError> {
        let status = self.status()?;
        let location = self.location();
        Ok(AdminPlaceDto {
            id: self.id,
            name: self.name,
            category: self.category_name,
            author_id: self.author_id,
            status,
            modified_date: self.modified_date,
            location,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OpeningHoursRow {
    week_day: String,
    open_time: NaiveTime,
    close_time: NaiveTime,
}

/// Data required to create a new place.
pub struct NewPlace<'a> {
    pub name: &'a str,
    pub category_id: i64,
    pub author_id: i64,
    pub status: PlaceStatus,
    pub modified_date: DateTime<Utc>,
}

const PLACE_INFO_SELECT: &str = "SELECT p.id, p.name, c.name AS category_name, p.author_id, \
     p.status, p.modified_date, l.address, l.lat, l.lng \
     FROM places AS p \
     JOIN categories AS c ON c.id = p.category_id \
     LEFT JOIN locations AS l ON l.place_id = p.id";

/// Repository for places together with their location, opening hours and rates.
#[derive(Clone)]
pub struct PlaceRepository {
    pool: SqlitePool,
}

impl PlaceRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Begins a SQLite transaction.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Inserts the place row and returns its id.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        place: &NewPlace<'_>,
    ) -> Result<i64, PlaceError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO places (name, category_id, author_id, status, modified_date) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(place.name)
        .bind(place.category_id)
        .bind(place.author_id)
        .bind(place.status.as_str())
        .bind(to_rfc3339(place.modified_date))
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Attaches the location. A lat/lng pair already in use maps to [`PlaceError::LocationTaken`].
    pub async fn insert_location(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        place_id: i64,
        location: &LocationAddressAndGeoDto,
    ) -> Result<(), PlaceError> {
        sqlx::query("INSERT INTO locations (place_id, address, lat, lng) VALUES (?, ?, ?, ?)")
            .bind(place_id)
            .bind(&location.address)
            .bind(location.lat)
            .bind(location.lng)
            .execute(&mut **tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    PlaceError::LocationTaken {
                        lat: location.lat,
                        lng: location.lng,
                    }
                } else {
                    PlaceError::Database(err)
                }
            })?;
        Ok(())
    }

    pub async fn insert_opening_hours(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        place_id: i64,
        hours: &OpeningHoursDto,
    ) -> Result<(), PlaceError> {
        sqlx::query(
            "INSERT INTO opening_hours (place_id, week_day, open_time, close_time) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(place_id)
        .bind(hours.week_day.as_str())
        .bind(hours.open_time)
        .bind(hours.close_time)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Place>, PlaceError> {
        let row = sqlx::query_as::<_, PlaceRow>(
            "SELECT id, name, category_id, author_id, status, modified_date FROM places WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PlaceRow::into_domain).transpose()
    }

    pub async fn exists(&self, id: i64) -> Result<bool, PlaceError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM places WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Returns the place occupying the exact coordinates, if any.
    pub async fn find_id_by_location(&self, lat: f64, lng: f64) -> Result<Option<i64>, PlaceError> {
        let found = sqlx::query_scalar("SELECT place_id FROM locations WHERE lat = ? AND lng = ?")
            .bind(lat)
            .bind(lng)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found)
    }

    /// Place with category name and location.
    pub async fn find_info(&self, id: i64) -> Result<Option<PlaceInfoRow>, PlaceError> {
        let sql = format!("{PLACE_INFO_SELECT} WHERE p.id = ?");
        let row = sqlx::query_as::<_, PlaceInfoRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Places with the given status, most recently modified first.
    pub async fn find_by_status(&self, status: PlaceStatus) -> Result<Vec<AdminPlaceDto>, PlaceError> {
        let sql = format!("{PLACE_INFO_SELECT} WHERE p.status = ? ORDER BY p.modified_date DESC, p.id DESC");
        let rows = sqlx::query_as::<_, PlaceInfoRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PlaceInfoRow::into_admin_dto).collect()
    }

    /// Places with the given status whose location lies inside the bounds (inclusive), ordered by id.
    pub async fn find_in_bounds(
        &self,
        bounds: &MapBoundsDto,
        status: PlaceStatus,
    ) -> Result<Vec<PlaceByBoundsDto>, PlaceError> {
        let sql = format!(
            "{PLACE_INFO_SELECT} WHERE p.status = ? \
             AND l.lat BETWEEN ? AND ? AND l.lng BETWEEN ? AND ? ORDER BY p.id"
        );
        let rows = sqlx::query_as::<_, PlaceInfoRow>(&sql)
            .bind(status.as_str())
            .bind(bounds.south_west_lat)
            .bind(bounds.north_east_lat)
            .bind(bounds.south_west_lng)
            .bind(bounds.north_east_lng)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let location = row.location()?;
                Some(PlaceByBoundsDto {
                    id: row.id,
                    name: row.name,
                    location,
                })
            })
            .collect())
    }

    /// Opening hours ordered Monday to Sunday.
    pub async fn opening_hours(&self, place_id: i64) -> Result<Vec<OpeningHoursDto>, PlaceError> {
        let rows = sqlx::query_as::<_, OpeningHoursRow>(
            "SELECT week_day, open_time, close_time FROM opening_hours WHERE place_id = ?",
        )
        .bind(place_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hours = rows
            .into_iter()
            .map(|row| {
                let week_day = row
                    .week_day
                    .parse::<WeekDay>()
                    .map_err(|err| PlaceError::InvalidStoredValue(err.to_string()))?;
                Ok(OpeningHoursDto {
                    week_day,
                    open_time: row.open_time,
                    close_time: row.close_time,
                })
            })
            .collect::<Result<Vec<_>, PlaceError>>()?;
        hours.sort_by_key(|entry| entry.week_day);
        Ok(hours)
    }

    /// Mean of all rates, `None` when the place has never been rated.
    pub async fn average_rate(&self, place_id: i64) -> Result<Option<f64>, PlaceError> {
        let avg: Option<f64> = sqlx::query_scalar("SELECT AVG(rate) FROM rates WHERE place_id = ?")
            .bind(place_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(avg)
    }

    /// Overwrites the status and modified date. Returns `false` when the place vanished.
    pub async fn update_status(
        &self,
        id: i64,
        status: PlaceStatus,
        modified_date: DateTime<Utc>,
    ) -> Result<bool, PlaceError> {
        let result = sqlx::query("UPDATE places SET status = ?, modified_date = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_rfc3339(modified_date))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes the place; location, hours and rates cascade.
    pub async fn delete(&self, id: i64) -> Result<bool, PlaceError> {
        let result = sqlx::query("DELETE FROM places WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn parse_status(value: Option<String>) -> Result<Option<PlaceStatus>, PlaceError> {
    value
        .map(|raw| {
            raw.parse::<PlaceStatus>()
                .map_err(|err| PlaceError::InvalidStoredValue(err.to_string()))
        })
        .transpose()
}

#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("a place already exists at lat {lat}, lng {lng}")]
    LocationTaken { lat: f64, lng: f64 },
    #[error("invalid stored value: {0}")]
    InvalidStoredValue(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
