//! Project data model types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub client_name: Option<String>,
    pub site_address: Option<String>,
    pub status: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget_total_cents: i64,
    pub currency: String,
    pub owner_id: String,
    pub progress: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateProjectParams {
    pub name: String,
    pub client_name: Option<String>,
    pub site_address: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget_total_cents: i64,
    pub currency: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProjectParams {
    pub name: Option<String>,
    pub client_name: Option<String>,
    pub site_address: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget_total_cents: Option<i64>,
    pub progress: Option<i64>,
}

pub fn valid_status(status: &str) -> bool {
    matches!(
        status,
        "planning" | "in_progress" | "on_hold" | "completed" | "archived"
    )
}
