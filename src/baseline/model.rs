//! Baseline data model types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Baseline {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub version: i64,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
}

/// Frozen copy of a task's plan at capture time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaselineSnapshot {
    pub id: String,
    pub baseline_id: String,
    pub task_id: String,
    pub task_title: String,
    pub planned_start: Option<String>,
    pub planned_end: Option<String>,
    pub planned_progress: i64,
    pub planned_cost_cents: i64,
}

/// Persisted per-task variance row from the latest comparison.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaselineVarianceRow {
    pub id: String,
    pub baseline_id: String,
    pub task_id: String,
    pub start_variance_days: Option<i64>,
    pub end_variance_days: Option<i64>,
    pub progress_variance: i64,
    pub impact: String,
    pub computed_at: String,
}
