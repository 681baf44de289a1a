//! User SQLite operations and access-control lookups.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::storage::{new_id, now_rfc3339};

use super::model::*;

pub struct UserStorage {
    pub(crate) pool: SqlitePool,
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, email: &str, role: &str) -> Result<User> {
        if !valid_role(role) {
            anyhow::bail!("invalid role: {role}");
        }
        let id = new_id();
        let now = now_rfc3339();
        sqlx::query("INSERT INTO users (id, name, email, role, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(email)
            .bind(role)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        Ok(sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Load the acting user or fail with the NOT_FOUND marker.
    pub async fn require_actor(&self, actor_id: &str) -> Result<User> {
        self.get(actor_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: user {actor_id}"))
    }

    /// Load the actor and verify they may access `project_id`.
    ///
    /// Admins may access any live project; members only projects they own.
    /// Fails with `NOT_FOUND:` when the project does not exist (or is
    /// soft-deleted) and `FORBIDDEN:` when visibility rules deny access.
    pub async fn require_project_access(&self, actor_id: &str, project_id: &str) -> Result<User> {
        let actor = self.require_actor(actor_id).await?;
        let owner: Option<(String,)> = sqlx::query_as(
            "SELECT owner_id FROM projects WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some((owner_id,)) = owner else {
            anyhow::bail!("NOT_FOUND: project {project_id}");
        };
        if !actor.is_admin() && owner_id != actor.id {
            anyhow::bail!("FORBIDDEN: user {actor_id} cannot access project {project_id}");
        }
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn make_storage() -> UserStorage {
        let storage = Storage::in_memory().await.unwrap();
        UserStorage::new(storage.pool())
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let s = make_storage().await;
        let u = s.create("Dana", "dana@studio.io", "admin").await.unwrap();
        assert!(!u.id.is_empty());
        assert_eq!(u.role, "admin");
        assert!(u.is_admin());

        let fetched = s.get(&u.id).await.unwrap().expect("should exist");
        assert_eq!(fetched.email, "dana@studio.io");
    }

    #[tokio::test]
    async fn test_invalid_role_rejected() {
        let s = make_storage().await;
        let err = s.create("X", "x@studio.io", "owner").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let s = make_storage().await;
        s.create("A", "dup@studio.io", "member").await.unwrap();
        let dup = s.create("B", "dup@studio.io", "member").await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_require_actor_not_found() {
        let s = make_storage().await;
        let err = s.require_actor("missing").await.unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND:"));
    }

    #[tokio::test]
    async fn test_project_access_rules() {
        let s = make_storage().await;
        let admin = s.create("Admin", "admin@studio.io", "admin").await.unwrap();
        let owner = s.create("Owner", "owner@studio.io", "member").await.unwrap();
        let other = s.create("Other", "other@studio.io", "member").await.unwrap();

        let now = crate::storage::now_rfc3339();
        sqlx::query(
            "INSERT INTO projects (id, name, owner_id, created_at, updated_at)
             VALUES ('p1', 'Loft', ?, ?, ?)",
        )
        .bind(&owner.id)
        .bind(&now)
        .bind(&now)
        .execute(&s.pool)
        .await
        .unwrap();

        // Owner and admin pass
        s.require_project_access(&owner.id, "p1").await.unwrap();
        s.require_project_access(&admin.id, "p1").await.unwrap();

        // Other member is forbidden
        let err = s.require_project_access(&other.id, "p1").await.unwrap_err();
        assert!(err.to_string().starts_with("FORBIDDEN:"));

        // Missing project is NOT_FOUND even for admin
        let err = s.require_project_access(&admin.id, "nope").await.unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND:"));
    }
}
