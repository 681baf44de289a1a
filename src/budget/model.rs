//! Expense and budget-summary data model types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Expense {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub vendor: Option<String>,
    pub incurred_on: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateExpenseParams {
    pub project_id: String,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub vendor: Option<String>,
    pub incurred_on: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpenseParams {
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub vendor: Option<String>,
    pub incurred_on: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryTotal {
    pub category: String,
    pub spent_cents: i64,
}

/// Aggregated spend view for one project.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSummary {
    pub project_id: String,
    pub budget_total_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    /// Spend as a percentage of budget, rounded to two decimals.
    /// None when the project has no budget set.
    pub percent_consumed: Option<f64>,
    pub by_category: Vec<CategoryTotal>,
}
