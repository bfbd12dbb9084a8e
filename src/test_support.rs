//! In-process harness for handler tests: an in-memory database, the real
//! router (minus rate limiting and CORS) and request helpers.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::{Share, ShareRepository, UserRepository};
use crate::middleware::csp::csp_middleware;
use crate::routes;
use crate::services::{auth::AuthService, init};
use crate::AppState;

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        if config.auth.secret.is_empty() {
            config.auth.secret = "test-secret".to_string();
        }
        config.database.url = "sqlite::memory:".to_string();

        let db = init::connect(&config.database.url, 1)
            .await
            .expect("in-memory database");
        let state = init::build_state(config, db).expect("application state");

        let router = routes::api_routes()
            .route("/health", get(routes::health::health_check))
            .nest("/api/auth", routes::auth::router())
            .with_state(state.clone())
            .layer(middleware::from_fn(csp_middleware));

        Self { state, router }
    }

    pub async fn raw(&self, req: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible")
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let resp = self.raw(req).await;
        let status = resp.status();
        (status, body_json(resp).await)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send("GET", path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send("POST", path, token, Some(body)).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send("PUT", path, token, Some(body)).await
    }

    /// Insert a user directly and return `(user_id, session_token)`.
    pub async fn user(&self, email: &str) -> (String, String) {
        let user = UserRepository::create_with_password(&self.state.db, email, "Test User", "!")
            .await
            .expect("insert user");
        let (token, _) = AuthService::create_session_token(&self.state.config.auth, &user.id)
            .expect("session token");
        (user.id, token)
    }

    /// Insert an active share whose expiry and creation time are offsets from now.
    pub async fn insert_share(
        &self,
        owner_id: &str,
        expires_in: Duration,
        created_offset: Duration,
    ) -> Share {
        let now = Utc::now();
        ShareRepository::create(&self.state.db, owner_id, now + expires_in, now + created_offset)
            .await
            .expect("insert share")
    }

    pub async fn deactivate(&self, share_id: &str) {
        sqlx::query("UPDATE shares SET active = 0 WHERE id = ?")
            .bind(share_id)
            .execute(&self.state.db)
            .await
            .expect("deactivate share");
    }
}

pub async fn body_text(resp: Response) -> String {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse a JSON body; empty or non-JSON bodies come back as `Value::Null`.
pub async fn body_json(resp: Response) -> Value {
    let text = body_text(resp).await;
    serde_json::from_str(&text).unwrap_or(Value::Null)
}
