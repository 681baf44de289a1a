//! Stored AI report rows.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiReport {
    pub id: String,
    pub project_id: String,
    pub report_type: String,
    pub model: String,
    pub content: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub created_by: String,
    pub created_at: String,
}

pub struct ReportStorage {
    pub(crate) pool: SqlitePool,
}

impl ReportStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        project_id: &str,
        report_type: &str,
        model: &str,
        content: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
        created_by: &str,
    ) -> Result<AiReport> {
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO ai_reports \
             (id, project_id, report_type, model, content, prompt_tokens, completion_tokens, \
              created_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(report_type)
        .bind(model)
        .bind(content)
        .bind(prompt_tokens)
        .bind(completion_tokens)
        .bind(created_by)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("report not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AiReport>> {
        Ok(sqlx::query_as("SELECT * FROM ai_reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<AiReport>> {
        Ok(sqlx::query_as(
            "SELECT * FROM ai_reports WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::model::CreateProjectParams;
    use crate::projects::storage::ProjectStorage;
    use crate::storage::Storage;
    use crate::users::storage::UserStorage;

    #[tokio::test]
    async fn test_store_and_list() {
        let pool = Storage::in_memory().await.unwrap().pool();
        let owner = UserStorage::new(pool.clone())
            .create("Owner", "owner@studio.io", "member")
            .await
            .unwrap();
        let project = ProjectStorage::new(pool.clone())
            .create(CreateProjectParams {
                name: "Fitout".to_string(),
                owner_id: owner.id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let s = ReportStorage::new(pool);
        let r = s
            .store(&project.id, "status", "gpt-4o-mini", "# Report\nAll on track.", 820, 310, &owner.id)
            .await
            .unwrap();
        assert_eq!(r.report_type, "status");
        assert_eq!(r.prompt_tokens, 820);

        let reports = s.list(&project.id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].content, "# Report\nAll on track.");
        assert!(s.get(&r.id).await.unwrap().is_some());
        assert!(s.get("missing").await.unwrap().is_none());
    }
}
