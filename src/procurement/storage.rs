//! Procurement SQLite operations and the BOQ aggregation.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339, with_timeout};

use super::model::*;

pub struct ProcurementStorage {
    pub(crate) pool: SqlitePool,
}

impl ProcurementStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, params: CreateItemParams) -> Result<ProcurementItem> {
        let quantity = params.quantity.unwrap_or(1);
        if quantity < 1 {
            anyhow::bail!("quantity must be at least 1");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO procurement_items \
             (id, project_id, name, category, supplier, quantity, unit_cost_cents, status, \
              expected_delivery, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&params.project_id)
        .bind(&params.name)
        .bind(params.category.as_deref().unwrap_or("general"))
        .bind(&params.supplier)
        .bind(quantity)
        .bind(params.unit_cost_cents.unwrap_or(0))
        .bind(&params.expected_delivery)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("procurement item not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<ProcurementItem>> {
        Ok(
            sqlx::query_as("SELECT * FROM procurement_items WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list(&self, project_id: &str, status: Option<&str>) -> Result<Vec<ProcurementItem>> {
        Ok(sqlx::query_as(
            "SELECT * FROM procurement_items WHERE project_id = ? AND deleted_at IS NULL \
             AND (? IS NULL OR status = ?) \
             ORDER BY created_at ASC",
        )
        .bind(project_id)
        .bind(status)
        .bind(status)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn update(&self, id: &str, params: UpdateItemParams) -> Result<ProcurementItem> {
        if let Some(quantity) = params.quantity {
            if quantity < 1 {
                anyhow::bail!("quantity must be at least 1");
            }
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE procurement_items SET \
             name = COALESCE(?, name), \
             category = COALESCE(?, category), \
             supplier = COALESCE(?, supplier), \
             quantity = COALESCE(?, quantity), \
             unit_cost_cents = COALESCE(?, unit_cost_cents), \
             po_number = COALESCE(?, po_number), \
             expected_delivery = COALESCE(?, expected_delivery), \
             updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&params.name)
        .bind(&params.category)
        .bind(&params.supplier)
        .bind(params.quantity)
        .bind(params.unit_cost_cents)
        .bind(&params.po_number)
        .bind(&params.expected_delivery)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: procurement item {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: procurement item {id}"))
    }

    /// Advance the lifecycle one step (or cancel). Entering `delivered`
    /// stamps actual_delivery when it was never set.
    pub async fn set_status(&self, id: &str, to: &str) -> Result<ProcurementItem> {
        if !valid_status(to) {
            anyhow::bail!("invalid procurement status: {to}");
        }
        let item = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: procurement item {id}"))?;
        if !can_transition(&item.status, to) {
            anyhow::bail!(
                "INVALID_TRANSITION: procurement item {id} cannot move from {} to {to}",
                item.status
            );
        }
        let now = now_rfc3339();
        let actual_delivery = if to == "delivered" {
            Some(chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string())
        } else {
            None
        };
        sqlx::query(
            "UPDATE procurement_items SET status = ?, \
             actual_delivery = COALESCE(actual_delivery, ?), updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(to)
        .bind(&actual_delivery)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: procurement item {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE procurement_items SET deleted_at = ?, updated_at = ? \
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

    /// Bill-of-quantities view: per-category counts, quantities and cost
    /// totals over live, non-cancelled items.
    pub async fn boq_summary(&self, project_id: &str) -> Result<Vec<BoqCategoryLine>> {
        with_timeout(async {
            let lines = sqlx::query_as(
                "SELECT category, \
                        COUNT(*) AS item_count, \
                        SUM(quantity) AS total_quantity, \
                        SUM(quantity * unit_cost_cents) AS total_cost_cents \
                 FROM procurement_items \
                 WHERE project_id = ? AND deleted_at IS NULL AND status != 'cancelled' \
                 GROUP BY category ORDER BY category ASC",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(lines)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::model::CreateProjectParams;
    use crate::projects::storage::ProjectStorage;
    use crate::storage::Storage;
    use crate::users::storage::UserStorage;

    async fn setup() -> (SqlitePool, String) {
        let pool = Storage::in_memory().await.unwrap().pool();
        let owner = UserStorage::new(pool.clone())
            .create("Owner", "owner@studio.io", "member")
            .await
            .unwrap();
        let project = ProjectStorage::new(pool.clone())
            .create(CreateProjectParams {
                name: "Fitout".to_string(),
                owner_id: owner.id,
                ..Default::default()
            })
            .await
            .unwrap();
        (pool, project.id)
    }

    fn item(project_id: &str, name: &str, category: &str, qty: i64, unit: i64) -> CreateItemParams {
        CreateItemParams {
            project_id: project_id.to_string(),
            name: name.to_string(),
            category: Some(category.to_string()),
            quantity: Some(qty),
            unit_cost_cents: Some(unit),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        let i = s
            .create(CreateItemParams {
                project_id,
                name: "Pendant light".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(i.status, "draft");
        assert_eq!(i.category, "general");
        assert_eq!(i.quantity, 1);
        assert!(i.po_number.is_none());
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        let i = s
            .create(item(&project_id, "Tiles", "flooring", 40, 1_200))
            .await
            .unwrap();

        for status in ["quoted", "ordered", "shipped", "delivered", "installed"] {
            let moved = s.set_status(&i.id, status).await.unwrap();
            assert_eq!(moved.status, status);
        }
        let done = s.get(&i.id).await.unwrap().unwrap();
        assert!(done.actual_delivery.is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_marker() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        let i = s
            .create(item(&project_id, "Sofa", "furniture", 1, 250_000))
            .await
            .unwrap();
        let err = s.set_status(&i.id, "delivered").await.unwrap_err();
        assert!(err.to_string().starts_with("INVALID_TRANSITION:"));
    }

    #[tokio::test]
    async fn test_cancelled_is_terminal() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        let i = s
            .create(item(&project_id, "Sofa", "furniture", 1, 250_000))
            .await
            .unwrap();
        s.set_status(&i.id, "cancelled").await.unwrap();
        assert!(s.set_status(&i.id, "quoted").await.is_err());
        assert!(s.set_status(&i.id, "cancelled").await.is_err());
    }

    #[tokio::test]
    async fn test_list_status_filter() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        let a = s
            .create(item(&project_id, "A", "lighting", 2, 10_000))
            .await
            .unwrap();
        s.create(item(&project_id, "B", "lighting", 1, 5_000))
            .await
            .unwrap();
        s.set_status(&a.id, "quoted").await.unwrap();

        assert_eq!(s.list(&project_id, None).await.unwrap().len(), 2);
        let quoted = s.list(&project_id, Some("quoted")).await.unwrap();
        assert_eq!(quoted.len(), 1);
        assert_eq!(quoted[0].id, a.id);
    }

    #[tokio::test]
    async fn test_boq_summary() {
        let (pool, project_id) = setup().await;
        let s = ProcurementStorage::new(pool);
        s.create(item(&project_id, "Tiles", "flooring", 40, 1_200))
            .await
            .unwrap();
        s.create(item(&project_id, "Skirting", "flooring", 20, 500))
            .await
            .unwrap();
        let cancelled = s
            .create(item(&project_id, "Rug", "flooring", 1, 30_000))
            .await
            .unwrap();
        s.set_status(&cancelled.id, "cancelled").await.unwrap();
        s.create(item(&project_id, "Pendant", "lighting", 6, 8_000))
            .await
            .unwrap();

        let boq = s.boq_summary(&project_id).await.unwrap();
        assert_eq!(boq.len(), 2);
        let flooring = &boq[0];
        assert_eq!(flooring.category, "flooring");
        assert_eq!(flooring.item_count, 2);
        assert_eq!(flooring.total_quantity, 60);
        assert_eq!(flooring.total_cost_cents, 40 * 1_200 + 20 * 500);
        assert_eq!(boq[1].category, "lighting");
        assert_eq!(boq[1].total_cost_cents, 48_000);
    }
}
