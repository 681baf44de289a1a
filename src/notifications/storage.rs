//! Notification SQLite operations.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339};

use super::model::Notification;

pub struct NotificationStorage {
    pub(crate) pool: SqlitePool,
}

impl NotificationStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn notify(
        &self,
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Notification> {
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, body, entity_type, entity_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(entity_type)
        .bind(entity_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("notification not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Notification>> {
        Ok(sqlx::query_as("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_for_user(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let rows = if unread_only {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? AND read_at IS NULL \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Marks one notification read. Scoped by user so an actor cannot touch
    /// another user's rows.
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<Notification> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
        )
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            anyhow::bail!("NOT_FOUND: notification {id}");
        }
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: notification {id}"))
    }

    /// Returns the number of rows newly marked read.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let now = now_rfc3339();
        let rows = sqlx::query(
            "UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::users::storage::UserStorage;

    async fn setup() -> (SqlitePool, String, String) {
        let pool = Storage::in_memory().await.unwrap().pool();
        let users = UserStorage::new(pool.clone());
        let a = users.create("A", "a@studio.io", "member").await.unwrap().id;
        let b = users.create("B", "b@studio.io", "member").await.unwrap().id;
        (pool, a, b)
    }

    #[tokio::test]
    async fn test_notify_and_list() {
        let (pool, a, b) = setup().await;
        let s = NotificationStorage::new(pool);
        s.notify(&a, "task_assigned", "Task assigned to you", "Demolition", Some("task"), Some("t1"))
            .await
            .unwrap();
        s.notify(&a, "report_ready", "Report ready", "", None, None)
            .await
            .unwrap();
        s.notify(&b, "task_assigned", "Task assigned to you", "Paint", Some("task"), Some("t2"))
            .await
            .unwrap();

        assert_eq!(s.list_for_user(&a, false).await.unwrap().len(), 2);
        assert_eq!(s.list_for_user(&b, false).await.unwrap().len(), 1);
        assert_eq!(s.unread_count(&a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_scoped_to_user() {
        let (pool, a, b) = setup().await;
        let s = NotificationStorage::new(pool);
        let n = s
            .notify(&a, "report_ready", "Report ready", "", None, None)
            .await
            .unwrap();

        // Another user cannot mark it read
        let err = s.mark_read(&n.id, &b).await.unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND:"));

        let read = s.mark_read(&n.id, &a).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(s.unread_count(&a).await.unwrap(), 0);
        assert!(s.list_for_user(&a, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let (pool, a, _) = setup().await;
        let s = NotificationStorage::new(pool);
        for i in 0..3 {
            s.notify(&a, "task_assigned", "Task assigned to you", &format!("t{i}"), None, None)
                .await
                .unwrap();
        }
        assert_eq!(s.mark_all_read(&a).await.unwrap(), 3);
        assert_eq!(s.unread_count(&a).await.unwrap(), 0);
        // Idempotent
        assert_eq!(s.mark_all_read(&a).await.unwrap(), 0);
    }
}
