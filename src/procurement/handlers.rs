//! Procurement RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{CreateItemParams, UpdateItemParams};
use super::storage::ProcurementStorage;

fn procurement_storage(ctx: &AppContext) -> ProcurementStorage {
    ProcurementStorage::new(ctx.storage.pool())
}

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct CreateParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    name: String,
    category: Option<String>,
    supplier: Option<String>,
    quantity: Option<i64>,
    #[serde(rename = "unitCostCents")]
    unit_cost_cents: Option<i64>,
    #[serde(rename = "expectedDelivery")]
    expected_delivery: Option<String>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    status: Option<String>,
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
    name: Option<String>,
    category: Option<String>,
    supplier: Option<String>,
    quantity: Option<i64>,
    #[serde(rename = "unitCostCents")]
    unit_cost_cents: Option<i64>,
    #[serde(rename = "poNumber")]
    po_number: Option<String>,
    #[serde(rename = "expectedDelivery")]
    expected_delivery: Option<String>,
}

#[derive(Deserialize)]
struct SetStatusParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct ProjectParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
}

/// `procurement.create`
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let item = procurement_storage(ctx)
        .create(CreateItemParams {
            project_id: p.project_id,
            name: p.name,
            category: p.category,
            supplier: p.supplier,
            quantity: p.quantity,
            unit_cost_cents: p.unit_cost_cents,
            expected_delivery: p.expected_delivery,
        })
        .await?;
    ctx.broadcaster.broadcast(
        "procurement.created",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `procurement.list`
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let items = procurement_storage(ctx)
        .list(&p.project_id, p.status.as_deref())
        .await?;
    Ok(json!({ "items": items }))
}

/// `procurement.get`
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = procurement_storage(ctx);
    let Some(item) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: procurement item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &item.project_id)
        .await?;
    Ok(serde_json::to_value(&item)?)
}

/// `procurement.update` — mutable fields only; status moves via setStatus.
pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let storage = procurement_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: procurement item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let item = storage
        .update(
            &p.id,
            UpdateItemParams {
                name: p.name,
                category: p.category,
                supplier: p.supplier,
                quantity: p.quantity,
                unit_cost_cents: p.unit_cost_cents,
                po_number: p.po_number,
                expected_delivery: p.expected_delivery,
            },
        )
        .await?;
    ctx.broadcaster.broadcast(
        "procurement.updated",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `procurement.setStatus` — validated lifecycle transition.
pub async fn set_status(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: SetStatusParams = serde_json::from_value(params)?;
    let storage = procurement_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: procurement item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let item = storage.set_status(&p.id, &p.status).await?;
    ctx.broadcaster.broadcast(
        "procurement.statusChanged",
        json!({ "itemId": item.id, "projectId": item.project_id, "status": item.status }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `procurement.delete` — soft delete.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = procurement_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: procurement item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    if !storage.delete(&p.id).await? {
        anyhow::bail!("NOT_FOUND: procurement item {}", p.id);
    }
    ctx.broadcaster.broadcast(
        "procurement.deleted",
        json!({ "itemId": p.id, "projectId": existing.project_id }),
    );
    Ok(json!({ "deleted": true }))
}

/// `procurement.boqSummary`
pub async fn boq_summary(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ProjectParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let lines = procurement_storage(ctx).boq_summary(&p.project_id).await?;
    Ok(json!({ "categories": lines }))
}
