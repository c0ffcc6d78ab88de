use cache_domain::{Error, Result};

use crate::models::CacheRow;
use crate::Db;

pub enum CacheFilter {
    All,
    Public,
    Private,
}

impl Db {
    pub async fn insert_cache(&self, row: &CacheRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO binary_cache (id, name, url, token, access, port, retention)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.url)
        .bind(&row.token)
        .bind(&row.access)
        .bind(&row.port)
        .bind(row.retention)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn update_cache(&self, row: &CacheRow) -> Result<()> {
        sqlx::query(
            "UPDATE binary_cache SET name = ?, url = ?, token = ?, access = ?, port = ?, retention = ?
             WHERE id = ?",
        )
        .bind(&row.name)
        .bind(&row.url)
        .bind(&row.token)
        .bind(&row.access)
        .bind(&row.port)
        .bind(row.retention)
        .bind(&row.id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_cache(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM binary_cache WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_all_cache_paths(&self, cache_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM store_path WHERE cache_name = ?")
            .bind(cache_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn get_cache(&self, name: &str) -> Result<Option<CacheRow>> {
        sqlx::query_as::<_, CacheRow>("SELECT * FROM binary_cache WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn get_cache_by_port(&self, port: u16) -> Result<Option<CacheRow>> {
        sqlx::query_as::<_, CacheRow>("SELECT * FROM binary_cache WHERE port = ?")
            .bind(port.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn list_caches(&self, filter: CacheFilter) -> Result<Vec<CacheRow>> {
        let query = match filter {
            CacheFilter::All => "SELECT * FROM binary_cache",
            CacheFilter::Public => "SELECT * FROM binary_cache WHERE access = 'public'",
            CacheFilter::Private => "SELECT * FROM binary_cache WHERE access = 'private'",
        };
        sqlx::query_as::<_, CacheRow>(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn rename_cache_in_workspaces(&self, old_name: &str, new_name: &str) -> Result<()> {
        sqlx::query("UPDATE workspace SET cache_name = ? WHERE cache_name = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn rename_cache_in_paths(&self, old_name: &str, new_name: &str) -> Result<()> {
        sqlx::query("UPDATE store_path SET cache_name = ? WHERE cache_name = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, port: u16) -> CacheRow {
        CacheRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            url: format!("http://{name}.example.com"),
            token: "tok".to_string(),
            access: "public".to_string(),
            port: port.to_string(),
            retention: -1,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::connect(&dir.path().join("t.sqlite")).await.unwrap();
        db.create_database().await.unwrap();

        db.insert_cache(&row("c1", 5000)).await.unwrap();
        let found = db.get_cache("c1").await.unwrap().unwrap();
        assert_eq!(found.name, "c1");
        assert_eq!(found.port_number(), 5000);

        assert!(db.get_cache_by_port(5000).await.unwrap().is_some());
        assert!(db.get_cache("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_sql_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::connect(&dir.path().join("t.sqlite")).await.unwrap();
        db.create_database().await.unwrap();

        let mut malicious = row("evil", 6000);
        malicious.name = "c1'; DROP TABLE binary_cache; --".to_string();
        db.insert_cache(&malicious).await.unwrap();

        // parameterized binds mean the table is still there and queryable
        assert!(db.get_cache(&malicious.name).await.unwrap().is_some());
        assert_eq!(db.list_caches(CacheFilter::All).await.unwrap().len(), 1);
    }
}
