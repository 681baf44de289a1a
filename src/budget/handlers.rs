//! Budget RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{CreateExpenseParams, UpdateExpenseParams};
use super::storage::BudgetStorage;

fn budget_storage(ctx: &AppContext) -> BudgetStorage {
    BudgetStorage::new(ctx.storage.pool())
}

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct AddParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    category: String,
    description: Option<String>,
    #[serde(rename = "amountCents")]
    amount_cents: i64,
    vendor: Option<String>,
    #[serde(rename = "incurredOn")]
    incurred_on: Option<String>,
}

#[derive(Deserialize)]
struct ProjectParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
}

#[derive(Deserialize)]
struct IdParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
}

#[derive(Deserialize)]
struct UpdateParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
    category: Option<String>,
    description: Option<String>,
    #[serde(rename = "amountCents")]
    amount_cents: Option<i64>,
    vendor: Option<String>,
    #[serde(rename = "incurredOn")]
    incurred_on: Option<String>,
}

/// `budget.addExpense`
pub async fn add_expense(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AddParams = serde_json::from_value(params)?;
    let actor = user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let expense = budget_storage(ctx)
        .add_expense(CreateExpenseParams {
            project_id: p.project_id,
            category: p.category,
            description: p.description,
            amount_cents: p.amount_cents,
            vendor: p.vendor,
            incurred_on: p.incurred_on,
            created_by: actor.id,
        })
        .await?;
    ctx.broadcaster.broadcast(
        "expense.created",
        json!({ "expenseId": expense.id, "projectId": expense.project_id }),
    );
    Ok(serde_json::to_value(&expense)?)
}

/// `budget.listExpenses`
pub async fn list_expenses(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ProjectParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let expenses = budget_storage(ctx).list(&p.project_id).await?;
    Ok(json!({ "expenses": expenses }))
}

/// `budget.updateExpense`
pub async fn update_expense(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let storage = budget_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: expense {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let expense = storage
        .update(
            &p.id,
            UpdateExpenseParams {
                category: p.category,
                description: p.description,
                amount_cents: p.amount_cents,
                vendor: p.vendor,
                incurred_on: p.incurred_on,
            },
        )
        .await?;
    ctx.broadcaster.broadcast(
        "expense.updated",
        json!({ "expenseId": expense.id, "projectId": expense.project_id }),
    );
    Ok(serde_json::to_value(&expense)?)
}

/// `budget.deleteExpense` — soft delete.
pub async fn delete_expense(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = budget_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: expense {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    if !storage.delete(&p.id).await? {
        anyhow::bail!("NOT_FOUND: expense {}", p.id);
    }
    ctx.broadcaster.broadcast(
        "expense.deleted",
        json!({ "expenseId": p.id, "projectId": existing.project_id }),
    );
    Ok(json!({ "deleted": true }))
}

/// `budget.summary`
pub async fn summary(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ProjectParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let summary = budget_storage(ctx).summary(&p.project_id).await?;
    Ok(serde_json::to_value(&summary)?)
}
