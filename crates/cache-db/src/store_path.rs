use cache_domain::{Error, Result};

use crate::models::{RawStorePathRow, StorePathRow};
use crate::Db;

impl Db {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_store_path(
        &self,
        id: &str,
        store_hash: &str,
        store_suffix: &str,
        file_hash: &str,
        file_size: i64,
        nar_hash: &str,
        nar_size: i64,
        deriver: &str,
        references: &[String],
        cache_name: &str,
    ) -> Result<()> {
        let refs = references.join(" ");
        sqlx::query(
            "INSERT INTO store_path
             (id, store_hash, store_suffix, file_hash, file_size, nar_hash, nar_size, deriver, refs, cache_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(store_hash)
        .bind(store_suffix)
        .bind(file_hash)
        .bind(file_size)
        .bind(nar_hash)
        .bind(nar_size)
        .bind(deriver)
        .bind(refs)
        .bind(cache_name)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn get_store_path_by_store_hash(
        &self,
        cache_name: &str,
        store_hash: &str,
    ) -> Result<Option<StorePathRow>> {
        let raw = sqlx::query_as::<_, RawStorePathRow>(
            "SELECT * FROM store_path WHERE store_hash = ? AND cache_name = ?",
        )
        .bind(store_hash)
        .bind(cache_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(raw.map(Into::into))
    }

    pub async fn get_store_path_by_file_hash(
        &self,
        cache_name: &str,
        file_hash: &str,
    ) -> Result<Option<StorePathRow>> {
        let raw = sqlx::query_as::<_, RawStorePathRow>(
            "SELECT * FROM store_path WHERE file_hash = ? AND cache_name = ?",
        )
        .bind(file_hash)
        .bind(cache_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(raw.map(Into::into))
    }

    pub async fn delete_store_path(&self, cache_name: &str, store_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM store_path WHERE store_hash = ? AND cache_name = ?")
            .bind(store_hash)
            .bind(cache_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn list_store_paths(&self, cache_name: &str) -> Result<Vec<StorePathRow>> {
        let raws = sqlx::query_as::<_, RawStorePathRow>(
            "SELECT * FROM store_path WHERE cache_name = ?",
        )
        .bind(cache_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(raws.into_iter().map(Into::into).collect())
    }
}
