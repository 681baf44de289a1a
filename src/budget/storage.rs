//! Expense SQLite operations and budget aggregation.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339, with_timeout};

use super::model::*;

pub struct BudgetStorage {
    pub(crate) pool: SqlitePool,
}

impl BudgetStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_expense(&self, params: CreateExpenseParams) -> Result<Expense> {
        if params.amount_cents < 0 {
            anyhow::bail!("expense amount must not be negative");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO expenses \
             (id, project_id, category, description, amount_cents, vendor, incurred_on, \
              created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&params.project_id)
        .bind(&params.category)
        .bind(params.description.as_deref().unwrap_or(""))
        .bind(params.amount_cents)
        .bind(&params.vendor)
        .bind(&params.incurred_on)
        .bind(&params.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("expense not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Expense>> {
        Ok(
            sqlx::query_as("SELECT * FROM expenses WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<Expense>> {
        Ok(sqlx::query_as(
            "SELECT * FROM expenses WHERE project_id = ? AND deleted_at IS NULL \
             ORDER BY incurred_on DESC, created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn update(&self, id: &str, params: UpdateExpenseParams) -> Result<Expense> {
        if let Some(amount) = params.amount_cents {
            if amount < 0 {
                anyhow::bail!("expense amount must not be negative");
            }
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE expenses SET \
             category = COALESCE(?, category), \
             description = COALESCE(?, description), \
             amount_cents = COALESCE(?, amount_cents), \
             vendor = COALESCE(?, vendor), \
             incurred_on = COALESCE(?, incurred_on), \
             updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&params.category)
        .bind(&params.description)
        .bind(params.amount_cents)
        .bind(&params.vendor)
        .bind(&params.incurred_on)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: expense {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: expense {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE expenses SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Spend roll-up against the project budget.
    pub async fn summary(&self, project_id: &str) -> Result<BudgetSummary> {
        with_timeout(async {
            let budget: Option<(i64,)> = sqlx::query_as(
                "SELECT budget_total_cents FROM projects WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
            let Some((budget_total_cents,)) = budget else {
                anyhow::bail!("NOT_FOUND: project {project_id}");
            };

            let (spent_cents,): (i64,) = sqlx::query_as(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM expenses \
                 WHERE project_id = ? AND deleted_at IS NULL",
            )
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

            let by_category: Vec<CategoryTotal> = sqlx::query_as(
                "SELECT category, SUM(amount_cents) AS spent_cents FROM expenses \
                 WHERE project_id = ? AND deleted_at IS NULL \
                 GROUP BY category ORDER BY spent_cents DESC",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

            let percent_consumed = if budget_total_cents > 0 {
                let pct = spent_cents as f64 / budget_total_cents as f64 * 100.0;
                Some((pct * 100.0).round() / 100.0)
            } else {
                None
            };

            Ok(BudgetSummary {
                project_id: project_id.to_string(),
                budget_total_cents,
                spent_cents,
                remaining_cents: budget_total_cents - spent_cents,
                percent_consumed,
                by_category,
            })
        })
        .await
    }
}
