//! Authentication adapter.
//!
//! Route handlers only see [`SessionResolver`]: given request headers it yields
//! the signed-in user or nothing. Everything else here (token signing, OAuth
//! state, password hashing, Google account linking) backs the handler mounted
//! at `/api/auth` and can be replaced without touching share/location routes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use url::Url;

use crate::config::AuthConfig;
use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::google::GoogleUser;
use crate::AppState;

pub const SESSION_COOKIE: &str = "chiramap.session_token";

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = 4;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub csrf_token: String,
    pub callback_url: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

/// A resolved session: the stable user id plus the user row.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// The only authentication contract the API routes depend on.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` means "no session"; errors are reserved for infrastructure failures.
    async fn resolve_session(&self, headers: &HeaderMap) -> AppResult<Option<AuthSession>>;
}

/// Resolves sessions from a signed token in `Authorization: Bearer` or the
/// session cookie, then loads the user.
pub struct JwtSessionResolver {
    db: SqlitePool,
    secret: String,
}

impl JwtSessionResolver {
    pub fn new(db: SqlitePool, secret: String) -> Self {
        Self { db, secret }
    }
}

#[async_trait]
impl SessionResolver for JwtSessionResolver {
    async fn resolve_session(&self, headers: &HeaderMap) -> AppResult<Option<AuthSession>> {
        let token = match session_token(headers) {
            Some(t) => t,
            None => return Ok(None),
        };

        let claims = match AuthService::decode_session_token(&self.secret, &token) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Ignoring invalid session token: {:?}", e);
                return Ok(None);
            }
        };

        let user = match UserRepository::find_by_id(&self.db, &claims.sub).await? {
            Some(u) => u,
            None => {
                tracing::debug!("Session token refers to unknown user {}", claims.sub);
                return Ok(None);
            }
        };

        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(Some(AuthSession {
            user_id: user.id.clone(),
            user,
            expires_at,
        }))
    }
}

/// Extract the raw session token, preferring the `Authorization` header.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ") {
            let token = value[7..].trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub struct AuthService;

impl AuthService {
    /// Create a signed session token for a user id, returning it with its expiry.
    pub fn create_session_token(
        config: &AuthConfig,
        user_id: &str,
    ) -> AppResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let exp = now + Duration::hours(config.session_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )?;
        Ok((token, exp))
    }

    /// Decode and validate a session token, returning the claims
    pub fn decode_session_token(secret: &str, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Generate a short-lived (10 minutes) signed OAuth state so no CSRF cookie is needed.
    pub fn generate_oauth_state(
        config: &AuthConfig,
        callback_url: Option<String>,
    ) -> AppResult<String> {
        let now = Utc::now();
        let state_claims = OAuthState {
            csrf_token: Self::generate_random_string(32),
            callback_url,
            iat: now.timestamp() as usize,
            exp: (now + Duration::minutes(10)).timestamp() as usize,
        };

        let state_jwt = encode(
            &Header::default(),
            &state_claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )?;

        Ok(state_jwt)
    }

    /// Decode and validate OAuth state JWT
    pub fn decode_oauth_state(config: &AuthConfig, state_encoded: &str) -> AppResult<OAuthState> {
        let token_data = decode::<OAuthState>(
            state_encoded,
            &DecodingKey::from_secret(config.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::error!("Failed to decode OAuth state: {:?}", e);
            e
        })?;
        Ok(token_data.claims)
    }

    pub async fn hash_password(password: &str) -> AppResult<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || bcrypt::hash(password, PASSWORD_HASH_COST))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(|e| AppError::Internal(e.into()))
    }

    pub async fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(|e| AppError::Internal(e.into()))
    }

    /// Complete a Google sign-in: exchange the code, load the account and
    /// upsert the matching user.
    pub async fn sign_in_with_google(
        state: &Arc<AppState>,
        code: &str,
        lang: Option<&str>,
    ) -> AppResult<User> {
        let token_response = state.google.exchange_code(code).await?;
        let google_user = state.google.get_user(&token_response.access_token).await?;

        Self::ensure_email_verified(&google_user, lang)?;

        let user = UserRepository::upsert_google(
            &state.db,
            &google_user.sub,
            &google_user.email.to_lowercase(),
            &google_user.display_name(),
            google_user.picture.as_deref(),
        )
        .await?;

        tracing::info!("Google sign-in successful for user {}", user.id);
        Ok(user)
    }

    /// Only verified Google addresses may create or link accounts.
    pub fn ensure_email_verified(google_user: &GoogleUser, lang: Option<&str>) -> AppResult<()> {
        if google_user.email_verified {
            return Ok(());
        }
        tracing::warn!("Rejected Google sign-in with unverified e-mail");
        Err(AppError::BadRequest(i18n::tr(
            lang,
            "auth.email_unverified",
            None,
        )))
    }

    /// Generate random string
    pub fn generate_random_string(length: usize) -> String {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    /// Accept relative paths (`/x`, not `//x`) or absolute URLs whose origin is
    /// one of the configured frontend origins.
    pub fn is_safe_redirect(redirect: &str, allowed_origins: &[String]) -> bool {
        if redirect.starts_with('/') && !redirect.starts_with("//") && !redirect.starts_with("/\\")
        {
            return true;
        }
        if let Ok(u) = Url::parse(redirect) {
            return allowed_origins.iter().any(|origin| {
                Url::parse(origin)
                    .map(|front| u.origin() == front.origin())
                    .unwrap_or(false)
            });
        }
        false
    }

    /// Resolve where to send the browser after sign-in.
    pub fn compose_redirect_url(
        frontend_base: &str,
        allowed_origins: &[String],
        callback_url: Option<&str>,
    ) -> String {
        let frontend = frontend_base.trim_end_matches('/');

        match callback_url {
            Some(r) if !r.is_empty() && Self::is_safe_redirect(r, allowed_origins) => {
                if r.starts_with('/') {
                    format!("{}{}", frontend, r)
                } else {
                    r.to_string()
                }
            }
            Some(r) if !r.is_empty() => {
                tracing::warn!("Rejected unsafe callbackURL value: {}", r);
                format!("{}/", frontend)
            }
            _ => format!("{}/", frontend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            secret: "test-secret".to_string(),
            session_hours: 1,
        }
    }

    #[test]
    fn session_token_round_trips_subject() {
        let config = auth_config();
        let (token, exp) = AuthService::create_session_token(&config, "user-1").unwrap();
        let claims = AuthService::decode_session_token(&config.secret, &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp as i64, exp.timestamp());
    }

    #[test]
    fn session_token_rejects_other_secret() {
        let (token, _) = AuthService::create_session_token(&auth_config(), "user-1").unwrap();
        assert!(AuthService::decode_session_token("other", &token).is_err());
    }

    #[test]
    fn oauth_state_keeps_callback_url() {
        let config = auth_config();
        let s = AuthService::generate_oauth_state(&config, Some("/share/x".to_string())).unwrap();
        let decoded = AuthService::decode_oauth_state(&config, &s).unwrap();
        assert_eq!(decoded.callback_url.as_deref(), Some("/share/x"));
        assert_eq!(decoded.csrf_token.len(), 32);
    }

    #[test]
    fn token_prefers_bearer_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("chiramap.session_token=from-cookie"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn safe_redirects() {
        let origins = vec!["https://chiramap.example".to_string()];
        assert!(AuthService::is_safe_redirect("/share/1", &origins));
        assert!(AuthService::is_safe_redirect(
            "https://chiramap.example/x",
            &origins
        ));
        assert!(!AuthService::is_safe_redirect("//evil.example", &origins));
        assert!(!AuthService::is_safe_redirect("https://evil.example/", &origins));
        assert!(!AuthService::is_safe_redirect("javascript:alert(1)", &origins));
    }

    #[test]
    fn compose_redirect_falls_back_to_frontend_root() {
        let origins = vec!["http://localhost:3000".to_string()];
        let base = "http://localhost:3000/";
        assert_eq!(
            AuthService::compose_redirect_url(base, &origins, Some("/share/abc")),
            "http://localhost:3000/share/abc"
        );
        assert_eq!(
            AuthService::compose_redirect_url(base, &origins, Some("https://evil.example")),
            "http://localhost:3000/"
        );
        assert_eq!(
            AuthService::compose_redirect_url(base, &origins, None),
            "http://localhost:3000/"
        );
    }

    #[test]
    fn unverified_google_email_is_rejected_in_request_language() {
        let mut user = GoogleUser {
            sub: "1".to_string(),
            email: "taro@example.com".to_string(),
            email_verified: false,
            name: None,
            picture: None,
        };

        match AuthService::ensure_email_verified(&user, Some("en")) {
            Err(AppError::BadRequest(msg)) => {
                assert_eq!(msg, "Google account e-mail is not verified")
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }
        match AuthService::ensure_email_verified(&user, None) {
            Err(AppError::BadRequest(msg)) => {
                assert_eq!(
                    msg,
                    "Googleアカウントのメールアドレスが確認されていません"
                )
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }

        user.email_verified = true;
        assert!(AuthService::ensure_email_verified(&user, Some("en")).is_ok());
    }

    #[tokio::test]
    async fn password_hash_verifies() {
        let hash = AuthService::hash_password("correct horse").await.unwrap();
        assert!(AuthService::verify_password("correct horse", &hash).await.unwrap());
        assert!(!AuthService::verify_password("wrong horse", &hash).await.unwrap());
    }
}
