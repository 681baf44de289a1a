//! Task and milestone SQLite operations.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339, with_timeout};

use super::model::*;

pub struct TaskStorage {
    pub(crate) pool: SqlitePool,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, params: CreateTaskParams) -> Result<Task> {
        let priority = params.priority.as_deref().unwrap_or("medium");
        if !valid_priority(priority) {
            anyhow::bail!("invalid task priority: {priority}");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO tasks \
             (id, project_id, title, description, status, priority, assignee_id, \
              planned_start, planned_end, progress, actual_cost_cents, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'todo', ?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&params.project_id)
        .bind(&params.title)
        .bind(params.description.as_deref().unwrap_or(""))
        .bind(priority)
        .bind(&params.assignee_id)
        .bind(&params.planned_start)
        .bind(&params.planned_end)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        with_timeout(async {
            let rows = sqlx::query_as(
                "SELECT * FROM tasks WHERE project_id = ? AND deleted_at IS NULL \
                 AND (? IS NULL OR status = ?) \
                 AND (? IS NULL OR assignee_id = ?) \
                 ORDER BY created_at ASC",
            )
            .bind(&filter.project_id)
            .bind(&filter.status)
            .bind(&filter.status)
            .bind(&filter.assignee_id)
            .bind(&filter.assignee_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    /// All live tasks of a project, used by baseline capture and reporting.
    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<Task>> {
        self.list(&TaskFilter {
            project_id: project_id.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Partial update. Moving a task to `done` forces progress to 100 and
    /// stamps actual_end if it was never set.
    pub async fn update(&self, id: &str, mut params: UpdateTaskParams) -> Result<Task> {
        if let Some(status) = &params.status {
            if !valid_status(status) {
                anyhow::bail!("invalid task status: {status}");
            }
        }
        if let Some(priority) = &params.priority {
            if !valid_priority(priority) {
                anyhow::bail!("invalid task priority: {priority}");
            }
        }
        if let Some(progress) = params.progress {
            if !(0..=100).contains(&progress) {
                anyhow::bail!("task progress must be within 0..=100, got {progress}");
            }
        }
        if params.status.as_deref() == Some("done") {
            params.progress = Some(100);
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: task {id}"))?;
            if current.actual_end.is_none() && params.actual_end.is_none() {
                params.actual_end = Some(today());
            }
        }
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE tasks SET \
             title = COALESCE(?, title), \
             description = COALESCE(?, description), \
             status = COALESCE(?, status), \
             priority = COALESCE(?, priority), \
             assignee_id = COALESCE(?, assignee_id), \
             planned_start = COALESCE(?, planned_start), \
             planned_end = COALESCE(?, planned_end), \
             actual_start = COALESCE(?, actual_start), \
             actual_end = COALESCE(?, actual_end), \
             progress = COALESCE(?, progress), \
             actual_cost_cents = COALESCE(?, actual_cost_cents), \
             updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&params.title)
        .bind(&params.description)
        .bind(&params.status)
        .bind(&params.priority)
        .bind(&params.assignee_id)
        .bind(&params.planned_start)
        .bind(&params.planned_end)
        .bind(&params.actual_start)
        .bind(&params.actual_end)
        .bind(params.progress)
        .bind(params.actual_cost_cents)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: task {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: task {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    // -- milestones --

    pub async fn create_milestone(
        &self,
        project_id: &str,
        title: &str,
        due_date: Option<&str>,
    ) -> Result<Milestone> {
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO milestones (id, project_id, title, due_date, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(title)
        .bind(due_date)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_milestone(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("milestone not found after insert"))
    }

    pub async fn get_milestone(&self, id: &str) -> Result<Option<Milestone>> {
        Ok(sqlx::query_as("SELECT * FROM milestones WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_milestones(&self, project_id: &str) -> Result<Vec<Milestone>> {
        Ok(sqlx::query_as(
            "SELECT * FROM milestones WHERE project_id = ? ORDER BY due_date ASC, created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Completing an already-completed milestone keeps the first stamp.
    pub async fn complete_milestone(&self, id: &str) -> Result<Milestone> {
        let now = now_rfc3339();
        sqlx::query("UPDATE milestones SET completed_at = COALESCE(completed_at, ?) WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_milestone(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: milestone {id}"))
    }

    pub async fn delete_milestone(&self, id: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM milestones WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
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

    #[tokio::test]
    async fn test_create_defaults() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id,
                title: "Demolition".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(t.status, "todo");
        assert_eq!(t.priority, "medium");
        assert_eq!(t.progress, 0);
        assert!(t.assignee_id.is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (pool, project_id) = setup().await;
        let assignee = UserStorage::new(pool.clone())
            .create("Crew", "crew@studio.io", "member")
            .await
            .unwrap();
        let s = TaskStorage::new(pool);
        let a = s
            .create(CreateTaskParams {
                project_id: project_id.clone(),
                title: "A".to_string(),
                assignee_id: Some(assignee.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        s.create(CreateTaskParams {
            project_id: project_id.clone(),
            title: "B".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        s.update(
            &a.id,
            UpdateTaskParams {
                status: Some("in_progress".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let all = s
            .list(&TaskFilter {
                project_id: project_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let in_progress = s
            .list(&TaskFilter {
                project_id: project_id.clone(),
                status: Some("in_progress".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, a.id);

        let mine = s
            .list(&TaskFilter {
                project_id,
                assignee_id: Some(assignee.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn test_done_forces_progress_and_actual_end() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id,
                title: "Paint".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let done = s
            .update(
                &t.id,
                UpdateTaskParams {
                    status: Some("done".to_string()),
                    progress: Some(60),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, "done");
        assert_eq!(done.progress, 100);
        assert!(done.actual_end.is_some());
    }

    #[tokio::test]
    async fn test_done_keeps_explicit_actual_end() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id,
                title: "Joinery".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let done = s
            .update(
                &t.id,
                UpdateTaskParams {
                    status: Some("done".to_string()),
                    actual_end: Some("2026-03-10".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.actual_end.as_deref(), Some("2026-03-10"));
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id,
                title: "T".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(s
            .update(
                &t.id,
                UpdateTaskParams {
                    status: Some("finished".to_string()),
                    ..Default::default()
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id: project_id.clone(),
                title: "Gone".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(s.delete(&t.id).await.unwrap());
        assert!(s.get(&t.id).await.unwrap().is_none());
        assert!(s.list_for_project(&project_id).await.unwrap().is_empty());
        assert!(!s.delete(&t.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_milestone_lifecycle() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let m = s
            .create_milestone(&project_id, "Handover", Some("2026-06-01"))
            .await
            .unwrap();
        assert!(m.completed_at.is_none());

        let done = s.complete_milestone(&m.id).await.unwrap();
        let stamp = done.completed_at.clone().unwrap();
        let again = s.complete_milestone(&m.id).await.unwrap();
        assert_eq!(again.completed_at.as_deref(), Some(stamp.as_str()));

        assert_eq!(s.list_milestones(&project_id).await.unwrap().len(), 1);
        assert!(s.delete_milestone(&m.id).await.unwrap());
        assert!(s.list_milestones(&project_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_out_of_range_rejected() {
        let (pool, project_id) = setup().await;
        let s = TaskStorage::new(pool);
        let t = s
            .create(CreateTaskParams {
                project_id,
                title: "Joinery".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        for bad in [-1, 101, 250] {
            let err = s
                .update(
                    &t.id,
                    UpdateTaskParams {
                        progress: Some(bad),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(err.to_string().contains("0..=100"), "accepted {bad}");
        }
        // Unchanged after the rejected updates
        assert_eq!(s.get(&t.id).await.unwrap().unwrap().progress, 0);

        let ok = s
            .update(
                &t.id,
                UpdateTaskParams {
                    progress: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ok.progress, 100);
    }
}
