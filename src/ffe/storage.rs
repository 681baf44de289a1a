//! FF&E SQLite operations.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339};

use super::model::*;

pub struct FfeStorage {
    pub(crate) pool: SqlitePool,
}

impl FfeStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, params: CreateFfeParams) -> Result<FfeItem> {
        let quantity = params.quantity.unwrap_or(1);
        if quantity < 1 {
            anyhow::bail!("quantity must be at least 1");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO ffe_items \
             (id, project_id, name, room, category, finish, dimensions, quantity, \
              unit_cost_cents, lead_time_days, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'specified', ?, ?)",
        )
        .bind(&id)
        .bind(&params.project_id)
        .bind(&params.name)
        .bind(&params.room)
        .bind(params.category.as_deref().unwrap_or("furniture"))
        .bind(&params.finish)
        .bind(&params.dimensions)
        .bind(quantity)
        .bind(params.unit_cost_cents.unwrap_or(0))
        .bind(params.lead_time_days)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ffe item not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<FfeItem>> {
        Ok(
            sqlx::query_as("SELECT * FROM ffe_items WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list(&self, filter: &FfeFilter) -> Result<Vec<FfeItem>> {
        Ok(sqlx::query_as(
            "SELECT * FROM ffe_items WHERE project_id = ? AND deleted_at IS NULL \
             AND (? IS NULL OR room = ?) \
             AND (? IS NULL OR status = ?) \
             ORDER BY room ASC, created_at ASC",
        )
        .bind(&filter.project_id)
        .bind(&filter.room)
        .bind(&filter.room)
        .bind(&filter.status)
        .bind(&filter.status)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn update(&self, id: &str, params: UpdateFfeParams) -> Result<FfeItem> {
        if let Some(status) = &params.status {
            if !valid_status(status) {
                anyhow::bail!("invalid ffe status: {status}");
            }
        }
        if let Some(quantity) = params.quantity {
            if quantity < 1 {
                anyhow::bail!("quantity must be at least 1");
            }
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE ffe_items SET \
             name = COALESCE(?, name), \
             room = COALESCE(?, room), \
             category = COALESCE(?, category), \
             finish = COALESCE(?, finish), \
             dimensions = COALESCE(?, dimensions), \
             quantity = COALESCE(?, quantity), \
             unit_cost_cents = COALESCE(?, unit_cost_cents), \
             lead_time_days = COALESCE(?, lead_time_days), \
             status = COALESCE(?, status), \
             updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&params.name)
        .bind(&params.room)
        .bind(&params.category)
        .bind(&params.finish)
        .bind(&params.dimensions)
        .bind(params.quantity)
        .bind(params.unit_cost_cents)
        .bind(params.lead_time_days)
        .bind(&params.status)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: ffe item {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: ffe item {id}"))
    }

    /// Approval clears any earlier rejection reason.
    pub async fn approve(&self, id: &str, approver_id: &str) -> Result<FfeItem> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE ffe_items SET status = 'approved', approved_by = ?, \
             rejection_reason = NULL, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(approver_id)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: ffe item {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: ffe item {id}"))
    }

    pub async fn reject(&self, id: &str, reason: &str) -> Result<FfeItem> {
        if reason.trim().is_empty() {
            anyhow::bail!("rejection requires a reason");
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE ffe_items SET status = 'rejected', rejection_reason = ?, \
             approved_by = NULL, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(reason)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: ffe item {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: ffe item {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE ffe_items SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
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
