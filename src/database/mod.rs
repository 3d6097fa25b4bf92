#![cfg(feature = "db")]

pub mod models;
pub mod repositories;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DbConfig;

const CONNECT_ATTEMPTS: usize = 5;

/// Postgres pool, checked with `SELECT 1` before it is handed out.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &DbConfig) -> Result<Self> {
        info!("Initializing database connection pool");

        let pool = Self::connect_with_retry(config, CONNECT_ATTEMPTS).await?;
        Self::check(&pool).await?;

        info!("Database connection pool initialized successfully");
        Ok(Self { pool })
    }

    /// Connect with exponential backoff
    async fn connect_with_retry(config: &DbConfig, max_attempts: usize) -> Result<PgPool> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            match Self::try_connect(config).await {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt >= max_attempts => {
                    return Err(e).context(format!(
                        "Failed to connect to database after {} attempts",
                        max_attempts
                    ));
                }
                Err(e) => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn try_connect(config: &DbConfig) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to create database pool")
    }

    async fn check(pool: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}
