use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::routes::{ApiJson, Lang};
use crate::services::auth::{AuthService, AuthSession, SESSION_COOKIE};
use crate::AppState;

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sign-in/google", get(sign_in_google))
        .route("/callback/google", get(callback_google))
        .route("/sign-up/email", post(sign_up_email))
        .route("/sign-in/email", post(sign_in_email))
        .route("/get-session", get(get_session))
        .route("/sign-out", post(sign_out))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GoogleSignInQuery {
    #[serde(rename = "callbackURL")]
    callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            image: user.image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionInfo,
    pub user: UserResponse,
}

// ============================================================================
// Cookies
// ============================================================================

fn session_cookie(config: &Config, token: String) -> Cookie<'static> {
    let secure = config.server.secure_cookies();
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        // Cross-site frontends need None, which browsers only accept on secure cookies.
        .same_site(if secure { SameSite::None } else { SameSite::Lax })
        .max_age(time::Duration::hours(config.auth.session_hours))
        .build()
}

fn cleared_session_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = session_cookie(config, String::new());
    cookie.make_removal();
    cookie
}

/// Issue a session for `user` and attach it as a cookie.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> AppResult<(CookieJar, String)> {
    let (token, _) = AuthService::create_session_token(&state.config.auth, &user.id)?;
    let jar = jar.add(session_cookie(&state.config, token.clone()));
    Ok((jar, token))
}

// ============================================================================
// Handlers
// ============================================================================

/// Redirect to the Google consent screen.
async fn sign_in_google(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GoogleSignInQuery>,
) -> AppResult<Redirect> {
    let callback_url = query.callback_url.filter(|c| !c.is_empty());
    let oauth_state = AuthService::generate_oauth_state(&state.config.auth, callback_url)?;

    Ok(Redirect::to(&state.google.get_auth_url(&oauth_state)))
}

/// Handle the Google OAuth callback
async fn callback_google(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    lang: Lang,
    Query(query): Query<CallbackQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::error!("Google OAuth error: {} - {}", error, description);
        return Err(AppError::BadRequest(format!("OAuth error: {}", error)));
    }

    let code = query.code.ok_or_else(|| {
        tracing::error!("OAuth callback missing authorization code");
        AppError::BadRequest("Missing authorization code".to_string())
    })?;

    let state_encoded = query.state.ok_or_else(|| {
        tracing::error!("OAuth callback missing state parameter");
        AppError::BadRequest("Missing state parameter".to_string())
    })?;

    let oauth_state = AuthService::decode_oauth_state(&state.config.auth, &state_encoded)?;

    let user = AuthService::sign_in_with_google(&state, &code, lang.0.as_deref()).await?;
    let (jar, _) = start_session(&state, jar, &user)?;

    let redirect_url = AuthService::compose_redirect_url(
        state.config.server.primary_origin(),
        &state.config.server.cors_origins,
        oauth_state.callback_url.as_deref(),
    );
    tracing::debug!("Redirecting signed-in user {} to {}", user.id, redirect_url);

    Ok((jar, Redirect::to(&redirect_url)))
}

fn validate_credentials(lang: &Lang, email: &str, password: &str) -> AppResult<()> {
    let valid_email = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);
    if !valid_email {
        return Err(AppError::BadRequest(lang.tr("auth.invalid_email")));
    }

    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        let min = PASSWORD_MIN_LEN.to_string();
        let max = PASSWORD_MAX_LEN.to_string();
        return Err(AppError::BadRequest(lang.tr_with(
            "auth.invalid_password",
            &[("min", min.as_str()), ("max", max.as_str())],
        )));
    }

    Ok(())
}

/// Create an e-mail/password account and sign it in.
async fn sign_up_email(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    lang: Lang,
    ApiJson(request): ApiJson<SignUpRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let email = request.email.trim().to_lowercase();
    validate_credentials(&lang, &email, &request.password)?;

    if UserRepository::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict(lang.tr("auth.email_taken")));
    }

    let name = match request.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => email.split('@').next().unwrap_or(&email).to_string(),
    };

    let password_hash = AuthService::hash_password(&request.password).await?;
    // A concurrent sign-up can still win between the check above and this insert.
    let user = UserRepository::create_with_password(&state.db, &email, &name, &password_hash)
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict(lang.tr("auth.email_taken")),
            e => e,
        })?;

    tracing::info!("Registered e-mail user {}", user.id);

    let (jar, token) = start_session(&state, jar, &user)?;
    Ok((
        jar,
        Json(TokenResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Sign in with e-mail and password.
async fn sign_in_email(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    lang: Lang,
    ApiJson(request): ApiJson<SignInRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let invalid = || AppError::InvalidCredentials(lang.tr("auth.invalid_credentials"));

    let user = UserRepository::find_by_email(&state.db, request.email.trim())
        .await?
        .ok_or_else(invalid)?;

    // Google-only accounts have no password to check.
    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !AuthService::verify_password(&request.password, hash).await? {
        tracing::debug!("Password mismatch for user {}", user.id);
        return Err(invalid());
    }

    tracing::info!("E-mail sign-in successful for user {}", user.id);

    let (jar, token) = start_session(&state, jar, &user)?;
    Ok((
        jar,
        Json(TokenResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Current session, or JSON `null` when signed out.
async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Option<SessionResponse>>> {
    let session = state.sessions.resolve_session(&headers).await?;

    Ok(Json(session.map(|s| SessionResponse {
        session: SessionInfo {
            user_id: s.user_id,
            expires_at: s.expires_at,
        },
        user: s.user.into(),
    })))
}

/// Sessions are stateless tokens, so signing out only clears the cookie.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.add(cleared_session_cookie(&state.config)),
        Json(serde_json::json!({ "success": true })),
    )
}

// ============================================================================
// Auth Extractor
// ============================================================================

/// The signed-in caller. Rejects with 401 when the request carries no valid session.
pub struct AuthUser(pub AuthSession);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = state
            .sessions
            .resolve_session(&parts.headers)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Request without a valid session");
                AppError::Unauthorized
            })?;

        Ok(AuthUser(session))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;

    use crate::db::UserRepository;
    use crate::test_support::{body_json, TestApp};

    async fn sign_up(app: &TestApp, email: &str) -> (StatusCode, serde_json::Value) {
        app.post(
            "/api/auth/sign-up/email",
            None,
            json!({ "email": email, "password": "correct horse", "name": "Taro" }),
        )
        .await
    }

    #[tokio::test]
    async fn sign_up_returns_token_and_sets_cookie() {
        let app = TestApp::new().await;
        let req = Request::post("/api/auth/sign-up/email")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "Taro@Example.com", "password": "correct horse" }).to_string(),
            ))
            .unwrap();

        let resp = app.raw(req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("chiramap.session_token="));
        assert!(cookie.contains("HttpOnly"));

        let body = body_json(resp).await;
        assert_eq!(body["user"]["email"], "taro@example.com");
        assert_eq!(body["user"]["name"], "taro");
        assert!(body["user"].get("passwordHash").is_none());

        let token = body["token"].as_str().unwrap();
        let (status, session) = app.get("/api/auth/get-session", Some(token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["session"]["userId"], body["user"]["id"]);
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicates_and_bad_input() {
        let app = TestApp::new().await;
        let (status, _) = sign_up(&app, "taro@example.com").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = sign_up(&app, "TARO@example.com").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, _) = sign_up(&app, "not-an-email").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .post(
                "/api/auth/sign-up/email",
                None,
                json!({ "email": "jiro@example.com", "password": "short" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "パスワードは8〜128文字で指定してください"
        );
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let app = TestApp::new().await;
        sign_up(&app, "taro@example.com").await;

        let (status, body) = app
            .post(
                "/api/auth/sign-in/email",
                None,
                json!({ "email": "taro@example.com", "password": "correct horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());

        let (status, body) = app
            .post(
                "/api/auth/sign-in/email",
                None,
                json!({ "email": "taro@example.com", "password": "wrong horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

        let (status, _) = app
            .post(
                "/api/auth/sign-in/email",
                None,
                json!({ "email": "nobody@example.com", "password": "correct horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn linking_google_disables_the_unverified_password() {
        let app = TestApp::new().await;
        sign_up(&app, "taro@example.com").await;

        UserRepository::upsert_google(&app.state.db, "g-1", "taro@example.com", "Taro", None)
            .await
            .unwrap();

        let (status, body) = app
            .post(
                "/api/auth/sign-in/email",
                None,
                json!({ "email": "taro@example.com", "password": "correct horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn get_session_accepts_cookie_and_returns_null_without_one() {
        let app = TestApp::new().await;
        let (_, token) = app.user("taro@example.com").await;

        let (status, body) = app.get("/api/auth/get-session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());

        let req = Request::get("/api/auth/get-session")
            .header(header::COOKIE, format!("chiramap.session_token={token}"))
            .body(Body::empty())
            .unwrap();
        let body = body_json(app.raw(req).await).await;
        assert_eq!(body["user"]["email"], "taro@example.com");

        let (_, body) = app.get("/api/auth/get-session", Some("garbage")).await;
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn sign_out_clears_cookie() {
        let app = TestApp::new().await;
        let resp = app
            .raw(
                Request::post("/api/auth/sign-out")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("chiramap.session_token=;"));
        assert!(cookie.contains("Max-Age=0"));

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn google_sign_in_redirects_to_consent_screen() {
        let app = TestApp::new().await;
        let resp = app
            .raw(
                Request::get("/api/auth/sign-in/google?callbackURL=%2Fshare%2Fabc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert!(resp.status().is_redirection());

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(location.starts_with("https://accounts.google.com/"));
        assert!(location.contains("state="));
    }

    #[tokio::test]
    async fn google_callback_rejects_errors_and_forged_state() {
        let app = TestApp::new().await;

        let (status, _) = app
            .get("/api/auth/callback/google?error=access_denied", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.get("/api/auth/callback/google?code=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .get("/api/auth/callback/google?code=abc&state=forged", None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }
}
