use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{de::Error as _, Deserialize, Deserializer};
use uuid::Uuid;

use crate::db::{Share, ShareRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiJson, Lang, OptionalApiJson};
use crate::services::sharing::{self, Visibility, DURATION_RANGE};
use crate::AppState;

/// Router for the share lifecycle endpoints
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_share))
        .route("/active", get(get_active_share))
        .route("/:id/active", put(set_share_active))
        .route("/:id", get(get_share))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    /// Minutes until expiry. Absent means the configured default; `null` is rejected.
    #[serde(default, deserialize_with = "whole_minutes")]
    pub expires_in: Option<i64>,
}

/// Accepts any JSON number with no fractional part (`10` and `10.0` alike).
fn whole_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(D::Error::custom("expiresIn must be a whole number of minutes"));
    }
    Ok(Some(value as i64))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// Start sharing. The caller becomes the owner of a new active share.
async fn create_share(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    lang: Lang,
    OptionalApiJson(request): OptionalApiJson<CreateShareRequest>,
) -> AppResult<Json<Share>> {
    let minutes = sharing::resolve_duration(request.expires_in, state.config.share.default_minutes)
        .ok_or_else(|| {
            let min = DURATION_RANGE.start().to_string();
            let max = DURATION_RANGE.end().to_string();
            AppError::BadRequest(lang.tr_with(
                "share.invalid_duration",
                &[("min", min.as_str()), ("max", max.as_str())],
            ))
        })?;

    let now = Utc::now();
    let share = ShareRepository::create(
        &state.db,
        &session.user_id,
        sharing::expires_at(now, minutes),
        now,
    )
    .await?;

    tracing::info!(
        "Share {} created by user {} for {} minutes",
        share.id,
        session.user_id,
        minutes
    );

    Ok(Json(share))
}

/// The caller's most recent live share.
async fn get_active_share(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    lang: Lang,
) -> AppResult<Json<Share>> {
    ShareRepository::find_active_for_owner(&state.db, &session.user_id, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(lang.tr("share.none_active")))
}

/// Toggle the active flag. Missing and foreign shares both answer 404 so
/// non-owners learn nothing about existence.
async fn set_share_active(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    lang: Lang,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SetActiveRequest>,
) -> AppResult<Json<Share>> {
    let share = ShareRepository::set_active(
        &state.db,
        &id,
        &session.user_id,
        request.active,
        Utc::now(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(lang.tr("share.not_found_or_unauthorized")))?;

    tracing::info!(
        "Share {} set active={} by user {}",
        share.id,
        share.active,
        session.user_id
    );

    Ok(Json(share))
}

/// Public lookup used by viewers before polling locations.
async fn get_share(
    State(state): State<Arc<AppState>>,
    lang: Lang,
    Path(id): Path<String>,
) -> AppResult<Json<Share>> {
    if Uuid::parse_str(&id).is_err() {
        return Err(AppError::BadRequest(lang.tr("share.invalid_id")));
    }

    let share = ShareRepository::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(lang.tr("share.not_found")))?;

    match sharing::visibility(&share, Utc::now()) {
        Visibility::Live => Ok(Json(share)),
        Visibility::Inactive => Err(AppError::Gone(lang.tr("share.inactive"))),
        Visibility::Expired => Err(AppError::Gone(lang.tr("share.expired"))),
    }
}
