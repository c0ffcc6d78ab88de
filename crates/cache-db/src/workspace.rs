use cache_domain::{Error, Result};

use crate::models::WorkspaceRow;
use crate::Db;

impl Db {
    pub async fn insert_workspace(&self, row: &WorkspaceRow) -> Result<()> {
        sqlx::query("INSERT INTO workspace (id, name, token, cache_name) VALUES (?, ?, ?, ?)")
            .bind(&row.id)
            .bind(&row.name)
            .bind(&row.token)
            .bind(&row.cache_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn update_workspace(&self, row: &WorkspaceRow) -> Result<()> {
        sqlx::query("UPDATE workspace SET name = ?, token = ?, cache_name = ? WHERE id = ?")
            .bind(&row.name)
            .bind(&row.token)
            .bind(&row.cache_name)
            .bind(&row.id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_workspace(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM workspace WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn get_workspace(&self, name: &str) -> Result<Option<WorkspaceRow>> {
        sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspace WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn get_workspace_by_token(&self, token: &str) -> Result<Option<WorkspaceRow>> {
        sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspace WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn list_workspaces(&self) -> Result<Vec<WorkspaceRow>> {
        sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspace")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CacheRow;

    #[tokio::test]
    async fn insert_and_get_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::connect(&dir.path().join("t.sqlite")).await.unwrap();
        db.create_database().await.unwrap();

        db.insert_cache(&CacheRow {
            id: "cache-1".into(),
            name: "c1".into(),
            url: "http://c1".into(),
            token: "tok".into(),
            access: "public".into(),
            port: "5000".into(),
            retention: -1,
        })
        .await
        .unwrap();

        db.insert_workspace(&WorkspaceRow {
            id: "w1".into(),
            name: "ws1".into(),
            token: "wtok".into(),
            cache_name: "c1".into(),
        })
        .await
        .unwrap();

        let found = db.get_workspace("ws1").await.unwrap().unwrap();
        assert_eq!(found.cache_name, "c1");
        assert!(db.get_workspace_by_token("wtok").await.unwrap().is_some());
    }
}
