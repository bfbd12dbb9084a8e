use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub share: ShareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Frontend origins allowed to call the API with credentials.
    /// Read from `CORS_ORIGIN` as a comma separated list; the first entry is the
    /// default redirect target after sign-in.
    pub cors_origins: Vec<String>,
    /// Whether to set the `Secure` flag on the session cookie.
    /// If `None`, it is inferred from the first CORS origin (`https` -> true).
    pub cookie_secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens and OAuth state.
    pub secret: String,
    pub session_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for /api/auth endpoints
    pub auth_per_second: u32,
    /// Burst size for /api/auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareConfig {
    /// Duration used when a create request omits `expiresIn`.
    pub default_minutes: i64,
    /// When true, location writes to an expired (but still active) share are
    /// rejected with 410 like reads are. Off by default.
    pub enforce_expiry_on_write: bool,
}

impl ServerConfig {
    pub fn primary_origin(&self) -> &str {
        self.cors_origins
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost:3000")
    }

    pub fn secure_cookies(&self) -> bool {
        self.cookie_secure
            .unwrap_or_else(|| self.primary_origin().starts_with("https://"))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnv(key.to_string()));

        let share_default_minutes: i64 = or("SHARE_DEFAULT_MINUTES", "60")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SHARE_DEFAULT_MINUTES".to_string()))?;
        if !crate::services::sharing::DURATION_RANGE.contains(&share_default_minutes) {
            return Err(ConfigError::InvalidValue(
                "SHARE_DEFAULT_MINUTES".to_string(),
            ));
        }

        Ok(Config {
            server: ServerConfig {
                host: or("HOST", "0.0.0.0"),
                port: or("PORT", "8787")
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                cors_origins: or("CORS_ORIGIN", "http://localhost:3000")
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                cookie_secure: var("COOKIE_SECURE").and_then(|v| parse_bool(&v)),
            },
            database: DatabaseConfig {
                url: or("DATABASE_URL", "sqlite://data/chiramap.db"),
                max_connections: or("DATABASE_MAX_CONNECTIONS", "5").parse().unwrap_or(5),
            },
            google: GoogleConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri: or(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:8787/api/auth/callback/google",
                ),
            },
            auth: AuthConfig {
                secret: required("AUTH_SECRET")?,
                session_hours: or("AUTH_SESSION_HOURS", "168").parse().unwrap_or(168),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: or("RATE_LIMIT_AUTH_PER_SECOND", "3").parse().unwrap_or(3),
                auth_burst: or("RATE_LIMIT_AUTH_BURST", "10").parse().unwrap_or(10),
            },
            share: ShareConfig {
                default_minutes: share_default_minutes,
                enforce_expiry_on_write: var("SHARE_ENFORCE_EXPIRY_ON_WRITE")
                    .and_then(|v| parse_bool(&v))
                    .unwrap_or(false),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8787,
                cors_origins: vec!["http://localhost:3000".to_string()],
                cookie_secure: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/chiramap.db".to_string(),
                max_connections: 5,
            },
            google: GoogleConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:8787/api/auth/callback/google".to_string(),
            },
            auth: AuthConfig {
                secret: String::new(),
                session_hours: 168,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            share: ShareConfig {
                default_minutes: 60,
                enforce_expiry_on_write: false,
            },
        }
    }
}
