//! Project SQLite operations.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339, with_timeout};

use super::model::*;

pub struct ProjectStorage {
    pub(crate) pool: SqlitePool,
}

impl ProjectStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, params: CreateProjectParams) -> Result<Project> {
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO projects \
             (id, name, client_name, site_address, status, start_date, end_date, \
              budget_total_cents, currency, owner_id, progress, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'planning', ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&params.name)
        .bind(&params.client_name)
        .bind(&params.site_address)
        .bind(&params.start_date)
        .bind(&params.end_date)
        .bind(params.budget_total_cents)
        .bind(params.currency.as_deref().unwrap_or("USD"))
        .bind(&params.owner_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("project not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Project>> {
        Ok(
            sqlx::query_as("SELECT * FROM projects WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// List live projects visible to the caller.
    ///
    /// `owner_id = None` means unscoped (admin view); `Some(id)` restricts to
    /// that owner (member view).
    pub async fn list(&self, owner_id: Option<&str>) -> Result<Vec<Project>> {
        with_timeout(async {
            let rows = if let Some(owner) = owner_id {
                sqlx::query_as(
                    "SELECT * FROM projects WHERE deleted_at IS NULL AND owner_id = ? \
                     ORDER BY updated_at DESC",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query_as(
                    "SELECT * FROM projects WHERE deleted_at IS NULL ORDER BY updated_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            };
            Ok(rows)
        })
        .await
    }

    /// Partial update — only provided fields change (COALESCE semantics).
    pub async fn update(&self, id: &str, params: UpdateProjectParams) -> Result<Project> {
        if let Some(status) = &params.status {
            if !valid_status(status) {
                anyhow::bail!("invalid project status: {status}");
            }
        }
        if let Some(progress) = params.progress {
            if !(0..=100).contains(&progress) {
                anyhow::bail!("project progress must be within 0..=100, got {progress}");
            }
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE projects SET \
             name = COALESCE(?, name), \
             client_name = COALESCE(?, client_name), \
             site_address = COALESCE(?, site_address), \
             status = COALESCE(?, status), \
             start_date = COALESCE(?, start_date), \
             end_date = COALESCE(?, end_date), \
             budget_total_cents = COALESCE(?, budget_total_cents), \
             progress = COALESCE(?, progress), \
             updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&params.name)
        .bind(&params.client_name)
        .bind(&params.site_address)
        .bind(&params.status)
        .bind(&params.start_date)
        .bind(&params.end_date)
        .bind(params.budget_total_cents)
        .bind(params.progress)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: project {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: project {id}"))
    }

    pub async fn set_status(&self, id: &str, status: &str) -> Result<Project> {
        self.update(
            id,
            UpdateProjectParams {
                status: Some(status.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    /// Soft delete. Returns false when the project is already gone.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE projects SET deleted_at = ?, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
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
    use crate::storage::Storage;
    use crate::users::storage::UserStorage;

    async fn make_pool() -> SqlitePool {
        Storage::in_memory().await.unwrap().pool()
    }

    async fn seed_owner(pool: &SqlitePool) -> String {
        UserStorage::new(pool.clone())
            .create("Owner", "owner@studio.io", "member")
            .await
            .unwrap()
            .id
    }

    fn create_params(owner_id: &str, name: &str) -> CreateProjectParams {
        CreateProjectParams {
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            budget_total_cents: 12_500_000,
            client_name: Some("Harbor Cafe".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_project() {
        let pool = make_pool().await;
        let owner = seed_owner(&pool).await;
        let s = ProjectStorage::new(pool);
        let p = s.create(create_params(&owner, "Cafe Refit")).await.unwrap();
        assert_eq!(p.name, "Cafe Refit");
        assert_eq!(p.status, "planning");
        assert_eq!(p.budget_total_cents, 12_500_000);
        assert_eq!(p.currency, "USD");
        assert_eq!(p.created_at, p.updated_at);
        assert!(p.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_list_scoped_by_owner() {
        let pool = make_pool().await;
        let owner_a = seed_owner(&pool).await;
        let owner_b = UserStorage::new(pool.clone())
            .create("B", "b@studio.io", "member")
            .await
            .unwrap()
            .id;
        let s = ProjectStorage::new(pool);
        s.create(create_params(&owner_a, "Alpha")).await.unwrap();
        s.create(create_params(&owner_a, "Beta")).await.unwrap();
        s.create(create_params(&owner_b, "Gamma")).await.unwrap();

        assert_eq!(s.list(None).await.unwrap().len(), 3);
        assert_eq!(s.list(Some(&owner_a)).await.unwrap().len(), 2);
        assert_eq!(s.list(Some(&owner_b)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let pool = make_pool().await;
        let owner = seed_owner(&pool).await;
        let s = ProjectStorage::new(pool);
        let p = s.create(create_params(&owner, "Original")).await.unwrap();
        let updated = s
            .update(
                &p.id,
                UpdateProjectParams {
                    name: Some("Renamed".to_string()),
                    progress: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.progress, 40);
        // Untouched fields keep their values
        assert_eq!(updated.client_name.as_deref(), Some("Harbor Cafe"));
        assert_eq!(updated.budget_total_cents, 12_500_000);
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let pool = make_pool().await;
        let owner = seed_owner(&pool).await;
        let s = ProjectStorage::new(pool);
        let p = s.create(create_params(&owner, "P")).await.unwrap();
        let err = s.set_status(&p.id, "finished").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_project() {
        let pool = make_pool().await;
        let owner = seed_owner(&pool).await;
        let s = ProjectStorage::new(pool);
        let p = s.create(create_params(&owner, "Doomed")).await.unwrap();

        assert!(s.delete(&p.id).await.unwrap());
        assert!(s.get(&p.id).await.unwrap().is_none());
        assert!(s.list(None).await.unwrap().is_empty());
        // Second delete is a no-op
        assert!(!s.delete(&p.id).await.unwrap());
        // Updates against a deleted project report NOT_FOUND
        let err = s
            .update(&p.id, UpdateProjectParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND:"));
    }

    #[tokio::test]
    async fn test_progress_out_of_range_rejected() {
        let pool = make_pool().await;
        let owner = seed_owner(&pool).await;
        let s = ProjectStorage::new(pool);
        let p = s.create(create_params(&owner, "Penthouse")).await.unwrap();

        let err = s
            .update(
                &p.id,
                UpdateProjectParams {
                    progress: Some(130),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0..=100"));
        assert_eq!(s.get(&p.id).await.unwrap().unwrap().progress, 0);
    }
}
