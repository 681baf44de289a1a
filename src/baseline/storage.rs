//! Baseline capture, lookup and comparison against live tasks.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339, with_timeout};
use crate::tasks::model::Task;

use super::model::*;
use super::variance::{self, EarnedValue, ProjectIndices, TaskVariance};

pub struct BaselineStorage {
    pub(crate) pool: SqlitePool,
}

/// Per-task comparison line returned by `compare`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskComparison {
    pub task_title: String,
    #[serde(flatten)]
    pub variance: TaskVariance,
    pub spi: Option<f64>,
    pub cpi: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineComparison {
    pub baseline_id: String,
    pub tasks: Vec<TaskComparison>,
    pub project: ProjectIndices,
}

impl BaselineStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Snapshot every live task of the project under a new baseline version.
    /// The previous active baseline, if any, is superseded. Version numbers
    /// are assigned inside the transaction so concurrent captures cannot
    /// collide.
    pub async fn capture(&self, project_id: &str, name: &str, created_by: &str) -> Result<Baseline> {
        let tasks: Vec<Task> = sqlx::query_as(
            "SELECT * FROM tasks WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let id = new_id();
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE baselines SET status = 'superseded' WHERE project_id = ? AND status = 'active'")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO baselines (id, project_id, name, version, status, created_by, created_at) \
             SELECT ?, ?, ?, COALESCE(MAX(version), 0) + 1, 'active', ?, ? \
             FROM baselines WHERE project_id = ?",
        )
        .bind(&id)
        .bind(project_id)
        .bind(name)
        .bind(created_by)
        .bind(&now)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        for task in &tasks {
            sqlx::query(
                "INSERT INTO baseline_snapshots \
                 (id, baseline_id, task_id, task_title, planned_start, planned_end, \
                  planned_progress, planned_cost_cents) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&id)
            .bind(&task.id)
            .bind(&task.title)
            .bind(&task.planned_start)
            .bind(&task.planned_end)
            .bind(task.progress)
            .bind(task.actual_cost_cents)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("baseline not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Baseline>> {
        Ok(sqlx::query_as("SELECT * FROM baselines WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<Baseline>> {
        Ok(sqlx::query_as(
            "SELECT * FROM baselines WHERE project_id = ? ORDER BY version DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn snapshots(&self, baseline_id: &str) -> Result<Vec<BaselineSnapshot>> {
        Ok(sqlx::query_as(
            "SELECT * FROM baseline_snapshots WHERE baseline_id = ? ORDER BY task_title ASC",
        )
        .bind(baseline_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn variances(&self, baseline_id: &str) -> Result<Vec<BaselineVarianceRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM baseline_variances WHERE baseline_id = ? ORDER BY task_id ASC",
        )
        .bind(baseline_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Compare the baseline against the current task rows, persist the
    /// per-task variances (replacing any earlier run) and return the full
    /// comparison including project SPI/CPI.
    pub async fn compare(&self, baseline_id: &str) -> Result<BaselineComparison> {
        with_timeout(async {
            let snapshots = self.snapshots(baseline_id).await?;
            if snapshots.is_empty() && self.get(baseline_id).await?.is_none() {
                anyhow::bail!("NOT_FOUND: baseline {baseline_id}");
            }

            let mut lines = Vec::new();
            let mut values: Vec<EarnedValue> = Vec::new();
            for snap in &snapshots {
                let task: Option<Task> =
                    sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND deleted_at IS NULL")
                        .bind(&snap.task_id)
                        .fetch_optional(&self.pool)
                        .await?;
                // Tasks deleted since capture drop out of the comparison
                let Some(task) = task else { continue };

                let v = variance::task_variance(
                    &snap.task_id,
                    snap.planned_start.as_deref(),
                    snap.planned_end.as_deref(),
                    task.actual_start.as_deref(),
                    task.actual_end.as_deref(),
                    snap.planned_progress,
                    task.progress,
                );
                let ev = variance::earned_value(
                    snap.planned_cost_cents,
                    snap.planned_progress,
                    task.progress,
                    task.actual_cost_cents,
                );
                lines.push(TaskComparison {
                    task_title: snap.task_title.clone(),
                    spi: variance::spi(&ev),
                    cpi: variance::cpi(&ev),
                    variance: v,
                });
                values.push(ev);
            }

            let now = now_rfc3339();
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM baseline_variances WHERE baseline_id = ?")
                .bind(baseline_id)
                .execute(&mut *tx)
                .await?;
            for line in &lines {
                sqlx::query(
                    "INSERT INTO baseline_variances \
                     (id, baseline_id, task_id, start_variance_days, end_variance_days, \
                      progress_variance, impact, computed_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(new_id())
                .bind(baseline_id)
                .bind(&line.variance.task_id)
                .bind(line.variance.start_variance_days)
                .bind(line.variance.end_variance_days)
                .bind(line.variance.progress_variance)
                .bind(line.variance.impact.as_str())
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;

            Ok(BaselineComparison {
                baseline_id: baseline_id.to_string(),
                tasks: lines,
                project: variance::project_indices(&values),
            })
        })
        .await
    }
}
