//! Initialization helpers for the application:
//! - database connection + migrations
//! - the application state shared by all handlers

use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;
use crate::services::auth::JwtSessionResolver;
use crate::services::google::GoogleService;
use crate::AppState;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

/// Open a SQLite pool with foreign keys enforced and run migrations.
///
/// In-memory databases live as long as their connection, so the pool keeps
/// its connections forever in that case.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if is_in_memory(db_url) {
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(connect_options).await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for a file-backed database before connecting.
pub async fn init_db(config: &Config) -> Result<SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    if !is_in_memory(db_url) {
        let db_path = db_url
            .strip_prefix("sqlite://")
            .or_else(|| db_url.strip_prefix("sqlite:"))
            .unwrap_or(db_url);
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_file_path = Path::new(db_path);

        if let Some(parent) = db_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
                tracing::info!(
                    "Database directory created or already exists: {}",
                    parent.display()
                );
            }
        }
    }

    connect(db_url, config.database.max_connections).await
}

/// Build the shared application state from a ready pool.
pub fn build_state(config: Config, db: SqlitePool) -> Result<Arc<AppState>> {
    let google = GoogleService::new(&config)?;
    let sessions = Arc::new(JwtSessionResolver::new(
        db.clone(),
        config.auth.secret.clone(),
    ));

    Ok(Arc::new(AppState {
        db,
        config,
        google,
        sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials() {
        assert_eq!(
            redact_db_url("postgres://user:pw@db.example:5432/app"),
            "postgres://db.example:5432/app"
        );
        assert_eq!(redact_db_url("not a url@host"), "(redacted)host");
    }

    #[tokio::test]
    async fn in_memory_pool_runs_migrations() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'shares', 'locations')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 3);
    }
}
