use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::User;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

const USER_COLUMNS: &str =
    "id, email, name, image, google_id, password_hash, created_at, updated_at";

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_google_id(pool: &SqlitePool, google_id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = ?"
        ))
        .bind(google_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Create an e-mail/password account. A duplicate e-mail yields `AppError::Conflict`.
    pub async fn create_with_password(
        pool: &SqlitePool,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, image, google_id, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, NULL, NULL, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("User with e-mail {} already exists", email))
            }
            e => AppError::Database(e),
        })
    }

    /// Create or update the user behind a Google account.
    ///
    /// Lookup order: Google subject first, then e-mail (linking an existing
    /// password account to Google), otherwise a new user is inserted.
    /// Linking drops the password: sign-up never verified that address, so
    /// whoever chose the password may not own the mailbox.
    pub async fn upsert_google(
        pool: &SqlitePool,
        google_id: &str,
        email: &str,
        name: &str,
        image: Option<&str>,
    ) -> AppResult<User> {
        let now = Utc::now();

        let existing = match Self::find_by_google_id(pool, google_id).await? {
            Some(user) => Some((user, false)),
            None => Self::find_by_email(pool, email)
                .await?
                .map(|user| (user, true)),
        };

        if let Some((user, linking)) = existing {
            if linking {
                tracing::info!("Linking Google account to existing user {}", user.id);
            }

            return sqlx::query_as::<_, User>(&format!(
                r#"
                UPDATE users
                SET google_id = ?, name = ?, image = ?, updated_at = ?,
                    password_hash = CASE WHEN ? THEN NULL ELSE password_hash END
                WHERE id = ?
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(google_id)
            .bind(name)
            .bind(image)
            .bind(now)
            .bind(linking)
            .bind(&user.id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database);
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, image, google_id, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(image)
        .bind(google_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
