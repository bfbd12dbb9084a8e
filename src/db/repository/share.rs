use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::Share;
use crate::error::{AppError, AppResult};

// ============================================================================
// Share Repository
// ============================================================================

pub struct ShareRepository;

const SHARE_COLUMNS: &str = "id, owner_id, expires_at, active, created_at, updated_at";

impl ShareRepository {
    /// Insert a new active share owned by `owner_id`.
    pub async fn create(
        pool: &SqlitePool,
        owner_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Share> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, Share>(&format!(
            r#"
            INSERT INTO shares (id, owner_id, expires_at, active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            RETURNING {SHARE_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(owner_id)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Fetch a share regardless of owner or state.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Share>> {
        sqlx::query_as::<_, Share>(&format!("SELECT {SHARE_COLUMNS} FROM shares WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Most recently created share of the owner that is active and not yet expired.
    pub async fn find_active_for_owner(
        pool: &SqlitePool,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Share>> {
        sqlx::query_as::<_, Share>(&format!(
            r#"
            SELECT {SHARE_COLUMNS}
            FROM shares
            WHERE owner_id = ? AND active = 1 AND expires_at > ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(owner_id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Set the `active` flag of a share owned by `owner_id`.
    ///
    /// Returns `None` when no row matched, which covers both a missing share
    /// and one owned by someone else.
    pub async fn set_active(
        pool: &SqlitePool,
        id: &str,
        owner_id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Share>> {
        sqlx::query_as::<_, Share>(&format!(
            r#"
            UPDATE shares
            SET active = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            RETURNING {SHARE_COLUMNS}
            "#
        ))
        .bind(active)
        .bind(now)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}
