use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Location, NewLocation};
use crate::error::{AppError, AppResult};

// ============================================================================
// Location Repository
// ============================================================================

pub struct LocationRepository;

const LOCATION_COLUMNS: &str =
    "id, share_id, lat, lng, heading, speed, accuracy, timestamp, created_at, updated_at";

impl LocationRepository {
    /// Append a position fix captured at `timestamp`. Rows are never updated.
    pub async fn create(
        pool: &SqlitePool,
        fix: &NewLocation,
        timestamp: DateTime<Utc>,
    ) -> AppResult<Location> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query_as::<_, Location>(&format!(
            r#"
            INSERT INTO locations (
                id, share_id, lat, lng, heading, speed, accuracy,
                timestamp, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {LOCATION_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(&fix.share_id)
        .bind(fix.lat)
        .bind(fix.lng)
        .bind(fix.heading)
        .bind(fix.speed)
        .bind(fix.accuracy)
        .bind(timestamp)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// The current position of a share: the row with the greatest timestamp.
    pub async fn find_latest_for_share(
        pool: &SqlitePool,
        share_id: &str,
    ) -> AppResult<Option<Location>> {
        sqlx::query_as::<_, Location>(&format!(
            r#"
            SELECT {LOCATION_COLUMNS}
            FROM locations
            WHERE share_id = ?
            ORDER BY timestamp DESC, created_at DESC
            LIMIT 1
            "#
        ))
        .bind(share_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}
