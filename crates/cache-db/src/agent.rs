use cache_domain::{Error, Result};

use crate::models::AgentRow;
use crate::Db;

impl Db {
    pub async fn insert_agent(&self, row: &AgentRow) -> Result<()> {
        sqlx::query("INSERT INTO agent (id, name, token, workspace_name) VALUES (?, ?, ?, ?)")
            .bind(&row.id)
            .bind(&row.name)
            .bind(&row.token)
            .bind(&row.workspace_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_agent(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM agent WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }

    pub async fn get_agent(&self, name: &str) -> Result<Option<AgentRow>> {
        sqlx::query_as::<_, AgentRow>("SELECT * FROM agent WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn list_workspace_agents(&self, workspace_name: &str) -> Result<Vec<AgentRow>> {
        sqlx::query_as::<_, AgentRow>("SELECT * FROM agent WHERE workspace_name = ?")
            .bind(workspace_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))
    }

    pub async fn delete_all_workspace_agents(&self, workspace_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM agent WHERE workspace_name = ?")
            .bind(workspace_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;
        Ok(())
    }
}
