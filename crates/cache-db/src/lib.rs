//! Persistence adapter: typed accessors over the four tables described by
//! the original dictionary-row schema (`binary_cache`, `store_path`,
//! `workspace`, `agent`), backed by a pooled `sqlx` SQLite connection with
//! parameterized queries throughout.

pub mod agent;
pub mod cache;
pub mod models;
pub mod store_path;
pub mod workspace;

use std::path::Path;

use cache_domain::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use models::{Access, AgentRow, CacheRow, StorePathRow, WorkspaceRow};

#[derive(Clone)]
pub struct Db {
    pub(crate) pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the SQLite database at `path` and return a
    /// pooled connection.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create the four tables if they don't already exist. Idempotent,
    /// unlike the original's "create only if the file is empty" check,
    /// since `CREATE TABLE IF NOT EXISTS` subsumes it without races.
    pub async fn create_database(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS binary_cache (
                id VARCHAR UNIQUE,
                name VARCHAR UNIQUE,
                url VARCHAR,
                token VARCHAR,
                access VARCHAR,
                port VARCHAR,
                retention INT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_path (
                id VARCHAR UNIQUE,
                store_hash VARCHAR,
                store_suffix VARCHAR,
                file_hash VARCHAR,
                file_size INT,
                nar_hash VARCHAR,
                nar_size INT,
                deriver VARCHAR,
                refs VARCHAR,
                cache_name VARCHAR,
                FOREIGN KEY(cache_name) REFERENCES binary_cache(name)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workspace (
                id VARCHAR UNIQUE,
                name VARCHAR,
                token VARCHAR,
                cache_name VARCHAR,
                FOREIGN KEY(cache_name) REFERENCES binary_cache(name)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent (
                id VARCHAR UNIQUE,
                name VARCHAR,
                token VARCHAR,
                workspace_name VARCHAR,
                FOREIGN KEY(workspace_name) REFERENCES workspace(name)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_database_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::connect(&dir.path().join("test.sqlite")).await.unwrap();
        db.create_database().await.unwrap();
        db.create_database().await.unwrap();
    }
}
