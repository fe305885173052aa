use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the data-access layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Transaction already finished")]
    TransactionClosed,

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds connection pools from `DATABASE_URL`.
///
/// Pools are handed to their owners explicitly; nothing here is cached
/// process-wide.
pub struct DatabaseManager;

impl DatabaseManager {
    /// Default database when `CAMPUS_DATABASE` is unset
    const DEFAULT_DB_NAME: &'static str = "campus_main";

    /// Connect to the campus database described by the environment
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let database_name =
            std::env::var("CAMPUS_DATABASE").unwrap_or_else(|_| Self::DEFAULT_DB_NAME.to_string());
        Self::connect_to(&database_name, config).await
    }

    /// Connect to a named database on the `DATABASE_URL` server
    pub async fn connect_to(database_name: &str, config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        if !Self::is_valid_db_name(database_name) {
            return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
        }

        let connection_string = Self::build_connection_string(database_name)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&connection_string)
            .await?;

        info!("Created database pool for: {}", database_name);
        Ok(pool)
    }

    fn build_connection_string(database_name: &str) -> Result<String, DatabaseError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        // Replace the path to the database name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        Ok(url.into_string())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Quote SQL identifier after validating it
    pub fn quote_identifier(name: &str) -> Result<String, DatabaseError> {
        if !Self::is_valid_identifier(name) {
            return Err(DatabaseError::InvalidIdentifier(name.to_string()));
        }
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    /// Table and column names: lowercase ascii, digits and underscores,
    /// starting with a letter
    fn is_valid_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return false,
        }
        name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    /// Validate database names to prevent injection. Accepts:
    /// - exact "campus_main"
    /// - names starting with "campus_" followed by [a-zA-Z0-9_]+
    fn is_valid_db_name(name: &str) -> bool {
        if name == Self::DEFAULT_DB_NAME {
            return true;
        }
        match name.strip_prefix("campus_") {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            None => false,
        }
    }
}
