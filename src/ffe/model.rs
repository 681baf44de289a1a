//! FF&E (furniture, fixtures & equipment) data model types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FfeItem {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub room: Option<String>,
    pub category: String,
    pub finish: Option<String>,
    pub dimensions: Option<String>,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub lead_time_days: Option<i64>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateFfeParams {
    pub project_id: String,
    pub name: String,
    pub room: Option<String>,
    pub category: Option<String>,
    pub finish: Option<String>,
    pub dimensions: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost_cents: Option<i64>,
    pub lead_time_days: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFfeParams {
    pub name: Option<String>,
    pub room: Option<String>,
    pub category: Option<String>,
    pub finish: Option<String>,
    pub dimensions: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost_cents: Option<i64>,
    pub lead_time_days: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FfeFilter {
    pub project_id: String,
    pub room: Option<String>,
    pub status: Option<String>,
}

pub fn valid_status(status: &str) -> bool {
    matches!(
        status,
        "specified" | "approved" | "rejected" | "ordered" | "delivered" | "installed"
    )
}
