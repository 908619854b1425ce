//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Listing service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Statement timeout applied to listing queries, in seconds (default: 10).
    pub statement_timeout_secs: u64,

    /// Public site URL used to build crop and image links
    /// (default: http://localhost:8090).
    pub site_url: String,
}

impl ListingConfig {
    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let statement_timeout_secs = var("LISTING_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("LISTING_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let site_url = var("SITE_URL")
            .unwrap_or_else(|| "http://localhost:8090".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database_url,
            database_max_connections,
            statement_timeout_secs,
            site_url,
        })
    }
}
