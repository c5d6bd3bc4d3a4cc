use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db::model;

pub struct DBClient {
    pool: SqlitePool,
}

impl DBClient {
    /// Opens (creating if needed) the SQLite database at `url` and ensures the schema exists.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        model::migrate(&pool).await?;

        Ok(Self {
            pool,
        })
    }

    /// A private in-memory database. A single connection keeps every query on the same database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        model::migrate(&pool).await?;

        Ok(Self {
            pool,
        })
    }

    pub fn conn(&self) -> &SqlitePool {
        &self.pool
    }
}
