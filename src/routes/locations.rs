use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::db::{Location, LocationRepository, NewLocation, ShareRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiJson, Lang};
use crate::services::sharing::{self, WriteDenied};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(post_location))
        .route("/:share_id", get(get_latest_location))
}

/// Record a position fix for one of the caller's shares.
async fn post_location(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    lang: Lang,
    ApiJson(fix): ApiJson<NewLocation>,
) -> AppResult<Json<Location>> {
    if Uuid::parse_str(&fix.share_id).is_err() {
        return Err(AppError::BadRequest(lang.tr("share.invalid_id")));
    }

    let share = ShareRepository::find_by_id(&state.db, &fix.share_id)
        .await?
        .ok_or_else(|| AppError::NotFound(lang.tr("share.not_found")))?;

    let now = Utc::now();
    sharing::authorize_location_write(
        &share,
        &session.user_id,
        now,
        state.config.share.enforce_expiry_on_write,
    )
    .map_err(|denied| match denied {
        WriteDenied::NotOwner => AppError::Forbidden,
        WriteDenied::Inactive => AppError::Gone(lang.tr("share.inactive")),
        WriteDenied::Expired => AppError::Gone(lang.tr("share.expired")),
    })?;

    let location = LocationRepository::create(&state.db, &fix, now).await?;
    tracing::debug!("Stored location {} for share {}", location.id, share.id);

    Ok(Json(location))
}

/// Public read of a share's current position. Share state is not re-checked
/// here; viewers gate on `GET /api/shares/:id` first.
async fn get_latest_location(
    State(state): State<Arc<AppState>>,
    lang: Lang,
    Path(share_id): Path<String>,
) -> AppResult<Json<Location>> {
    LocationRepository::find_latest_for_share(&state.db, &share_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(lang.tr("location.not_found")))
}
