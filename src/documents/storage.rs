//! Document registry SQLite operations.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339};

use super::model::*;

pub struct DocumentStorage {
    pub(crate) pool: SqlitePool,
}

impl DocumentStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, params: RegisterDocumentParams) -> Result<Document> {
        let kind = params.kind.as_deref().unwrap_or("other");
        if !valid_kind(kind) {
            anyhow::bail!("invalid document kind: {kind}");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO documents \
             (id, project_id, title, kind, file_name, content_type, size_bytes, \
              storage_path, version, uploaded_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(&params.project_id)
        .bind(&params.title)
        .bind(kind)
        .bind(&params.file_name)
        .bind(&params.content_type)
        .bind(params.size_bytes.unwrap_or(0))
        .bind(&params.storage_path)
        .bind(&params.uploaded_by)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("document not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(
            sqlx::query_as("SELECT * FROM documents WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list(&self, project_id: &str, kind: Option<&str>) -> Result<Vec<Document>> {
        Ok(sqlx::query_as(
            "SELECT * FROM documents WHERE project_id = ? AND deleted_at IS NULL \
             AND (? IS NULL OR kind = ?) \
             ORDER BY title ASC, version DESC",
        )
        .bind(project_id)
        .bind(kind)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Register a new revision of an existing document. The version number
    /// is one past the highest revision sharing the same project and title,
    /// soft-deleted revisions included so numbers are never reused.
    pub async fn new_version(
        &self,
        document_id: &str,
        file_name: &str,
        content_type: Option<&str>,
        size_bytes: i64,
        storage_path: &str,
        uploaded_by: &str,
    ) -> Result<Document> {
        let prior = self
            .get(document_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: document {document_id}"))?;

        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO documents \
             (id, project_id, title, kind, file_name, content_type, size_bytes, \
              storage_path, version, uploaded_by, created_at) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(MAX(version), 0) + 1, ?, ? \
             FROM documents WHERE project_id = ? AND title = ?",
        )
        .bind(&id)
        .bind(&prior.project_id)
        .bind(&prior.title)
        .bind(&prior.kind)
        .bind(file_name)
        .bind(content_type)
        .bind(size_bytes)
        .bind(storage_path)
        .bind(uploaded_by)
        .bind(&now)
        .bind(&prior.project_id)
        .bind(&prior.title)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("document not found after insert"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query("UPDATE documents SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::model::CreateProjectParams;
    use crate::projects::storage::ProjectStorage;
    use crate::storage::Storage;
    use crate::users::storage::UserStorage;

    async fn setup() -> (SqlitePool, String, String) {
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
        (pool, project.id, owner.id)
    }

    fn doc(project_id: &str, owner: &str, title: &str, kind: &str) -> RegisterDocumentParams {
        RegisterDocumentParams {
            project_id: project_id.to_string(),
            title: title.to_string(),
            kind: Some(kind.to_string()),
            file_name: format!("{title}.pdf"),
            storage_path: format!("/files/{title}.pdf"),
            uploaded_by: owner.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_list_by_kind() {
        let (pool, project_id, owner) = setup().await;
        let s = DocumentStorage::new(pool);
        s.register(doc(&project_id, &owner, "Floor plan", "drawing"))
            .await
            .unwrap();
        s.register(doc(&project_id, &owner, "Main contract", "contract"))
            .await
            .unwrap();

        assert_eq!(s.list(&project_id, None).await.unwrap().len(), 2);
        let drawings = s.list(&project_id, Some("drawing")).await.unwrap();
        assert_eq!(drawings.len(), 1);
        assert_eq!(drawings[0].title, "Floor plan");
        assert_eq!(drawings[0].version, 1);
    }

    #[tokio::test]
    async fn test_invalid_kind_rejected() {
        let (pool, project_id, owner) = setup().await;
        let s = DocumentStorage::new(pool);
        assert!(s
            .register(doc(&project_id, &owner, "X", "spreadsheet"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_new_version_increments() {
        let (pool, project_id, owner) = setup().await;
        let s = DocumentStorage::new(pool);
        let v1 = s
            .register(doc(&project_id, &owner, "Floor plan", "drawing"))
            .await
            .unwrap();

        let v2 = s
            .new_version(&v1.id, "floor-plan-r2.pdf", None, 2048, "/files/floor-plan-r2.pdf", &owner)
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.title, "Floor plan");
        assert_eq!(v2.kind, "drawing");

        // Numbering continues even when the prior revision was deleted
        s.delete(&v2.id).await.unwrap();
        let v3 = s
            .new_version(&v1.id, "floor-plan-r3.pdf", None, 4096, "/files/floor-plan-r3.pdf", &owner)
            .await
            .unwrap();
        assert_eq!(v3.version, 3);
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let (pool, project_id, owner) = setup().await;
        let s = DocumentStorage::new(pool);
        let d = s
            .register(doc(&project_id, &owner, "Invoice 7", "invoice"))
            .await
            .unwrap();
        assert!(s.delete(&d.id).await.unwrap());
        assert!(s.get(&d.id).await.unwrap().is_none());
        assert!(!s.delete(&d.id).await.unwrap());
    }
}
