use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Thin OAuth 2.0 client for Google sign-in (authorization code flow).
#[derive(Debug, Clone)]
pub struct GoogleService {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

// ============================================================================
// OAuth Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// OpenID Connect userinfo claims we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl GoogleUser {
    /// Display name, falling back to the local part of the e-mail address.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => self.email.split('@').next().unwrap_or(&self.email).to_string(),
        }
    }
}

impl GoogleService {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            redirect_uri: config.google.redirect_uri.clone(),
        })
    }

    /// Generate the consent screen URL for the given signed `state`.
    pub fn get_auth_url(&self, state: &str) -> String {
        let scope = Self::get_required_scopes().join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::OAuthProvider(format!(
                "Failed to exchange code: {}",
                error_text
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Failed to parse token response: {}", e)))
    }

    /// Get the signed-in Google account for an access token
    pub async fn get_user(&self, access_token: &str) -> AppResult<GoogleUser> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::OAuthProvider(format!(
                "Failed to get user: {}",
                error_text
            )));
        }

        response
            .json::<GoogleUser>()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Failed to parse userinfo: {}", e)))
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["openid", "email", "profile"]
    }
}
