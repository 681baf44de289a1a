//! Procurement data model and status lifecycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcurementItem {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub category: String,
    pub supplier: Option<String>,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub status: String,
    pub po_number: Option<String>,
    pub expected_delivery: Option<String>,
    pub actual_delivery: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateItemParams {
    pub project_id: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost_cents: Option<i64>,
    pub expected_delivery: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItemParams {
    pub name: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost_cents: Option<i64>,
    pub po_number: Option<String>,
    pub expected_delivery: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BoqCategoryLine {
    pub category: String,
    pub item_count: i64,
    pub total_quantity: i64,
    pub total_cost_cents: i64,
}

/// Ordered lifecycle; `cancelled` may be entered from any non-terminal state.
const LIFECYCLE: [&str; 6] = ["draft", "quoted", "ordered", "shipped", "delivered", "installed"];

pub fn valid_status(status: &str) -> bool {
    status == "cancelled" || LIFECYCLE.contains(&status)
}

/// One step forward along the lifecycle, or cancellation of a non-terminal
/// item. `installed` and `cancelled` are terminal.
pub fn can_transition(from: &str, to: &str) -> bool {
    if from == "installed" || from == "cancelled" {
        return false;
    }
    if to == "cancelled" {
        return true;
    }
    match (
        LIFECYCLE.iter().position(|s| *s == from),
        LIFECYCLE.iter().position(|s| *s == to),
    ) {
        (Some(f), Some(t)) => t == f + 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_steps_allowed() {
        assert!(can_transition("draft", "quoted"));
        assert!(can_transition("quoted", "ordered"));
        assert!(can_transition("ordered", "shipped"));
        assert!(can_transition("shipped", "delivered"));
        assert!(can_transition("delivered", "installed"));
    }

    #[test]
    fn test_skips_and_backwards_rejected() {
        assert!(!can_transition("draft", "ordered"));
        assert!(!can_transition("draft", "installed"));
        assert!(!can_transition("quoted", "draft"));
        assert!(!can_transition("delivered", "shipped"));
        assert!(!can_transition("draft", "draft"));
    }

    #[test]
    fn test_cancellation() {
        assert!(can_transition("draft", "cancelled"));
        assert!(can_transition("delivered", "cancelled"));
        assert!(!can_transition("installed", "cancelled"));
        assert!(!can_transition("cancelled", "cancelled"));
        assert!(!can_transition("cancelled", "draft"));
    }
}
