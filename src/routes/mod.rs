use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    routing::get,
    Router,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::i18n;
use crate::AppState;

pub mod auth;
pub mod health;
pub mod locations;
pub mod shares;

/// Resource routes under `/api`. The auth handler is nested separately so the
/// caller can wrap it in its own layers (rate limiting).
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api", get(index))
        .nest("/api/shares", shares::router())
        .nest("/api/locations", locations::router())
}

async fn index() -> &'static str {
    "Chiramap API is running!"
}

/// JSON body extractor whose rejections become `400 Bad Request`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Like [`ApiJson`], but a request without a body (and without a
/// `Content-Type`) yields `T::default()`.
pub struct OptionalApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalApiJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if req.headers().contains_key(header::CONTENT_TYPE) {
            let ApiJson(value) = ApiJson::<T>::from_request(req, state).await?;
            return Ok(OptionalApiJson(value));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            Ok(OptionalApiJson(T::default()))
        } else {
            Err(AppError::BadRequest(
                "Expected request with `Content-Type: application/json`".to_string(),
            ))
        }
    }
}

/// Preferred response language negotiated from `Accept-Language`.
/// `None` means the default language.
#[derive(Debug, Clone, Default)]
pub struct Lang(pub Option<String>);

impl Lang {
    pub fn tr(&self, key: &str) -> String {
        i18n::tr(self.0.as_deref(), key, None)
    }

    pub fn tr_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        i18n::tr(self.0.as_deref(), key, Some(params))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Lang {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Lang(
            parts
                .headers
                .get(header::ACCEPT_LANGUAGE)
                .and_then(|v| v.to_str().ok())
                .and_then(i18n::negotiate),
        ))
    }
}
