//! User data model types.

use serde::{Deserialize, Serialize};

/// Role strings stored on user rows.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEMBER: &str = "member";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn valid_role(role: &str) -> bool {
    matches!(role, ROLE_ADMIN | ROLE_MEMBER)
}
