//! FF&E RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{CreateFfeParams, FfeFilter, UpdateFfeParams};
use super::storage::FfeStorage;

fn ffe_storage(ctx: &AppContext) -> FfeStorage {
    FfeStorage::new(ctx.storage.pool())
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
    room: Option<String>,
    category: Option<String>,
    finish: Option<String>,
    dimensions: Option<String>,
    quantity: Option<i64>,
    #[serde(rename = "unitCostCents")]
    unit_cost_cents: Option<i64>,
    #[serde(rename = "leadTimeDays")]
    lead_time_days: Option<i64>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    room: Option<String>,
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
    room: Option<String>,
    category: Option<String>,
    finish: Option<String>,
    dimensions: Option<String>,
    quantity: Option<i64>,
    #[serde(rename = "unitCostCents")]
    unit_cost_cents: Option<i64>,
    #[serde(rename = "leadTimeDays")]
    lead_time_days: Option<i64>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct RejectParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
    reason: String,
}

/// `ffe.create`
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let item = ffe_storage(ctx)
        .create(CreateFfeParams {
            project_id: p.project_id,
            name: p.name,
            room: p.room,
            category: p.category,
            finish: p.finish,
            dimensions: p.dimensions,
            quantity: p.quantity,
            unit_cost_cents: p.unit_cost_cents,
            lead_time_days: p.lead_time_days,
        })
        .await?;
    ctx.broadcaster.broadcast(
        "ffe.created",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `ffe.list`
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let items = ffe_storage(ctx)
        .list(&FfeFilter {
            project_id: p.project_id,
            room: p.room,
            status: p.status,
        })
        .await?;
    Ok(json!({ "items": items }))
}

/// `ffe.update`
pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let storage = ffe_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: ffe item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let item = storage
        .update(
            &p.id,
            UpdateFfeParams {
                name: p.name,
                room: p.room,
                category: p.category,
                finish: p.finish,
                dimensions: p.dimensions,
                quantity: p.quantity,
                unit_cost_cents: p.unit_cost_cents,
                lead_time_days: p.lead_time_days,
                status: p.status,
            },
        )
        .await?;
    ctx.broadcaster.broadcast(
        "ffe.updated",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `ffe.approve` — the actor is recorded as approver.
pub async fn approve(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = ffe_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: ffe item {}", p.id);
    };
    let actor = user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let item = storage.approve(&p.id, &actor.id).await?;
    ctx.broadcaster.broadcast(
        "ffe.approved",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `ffe.reject` — a non-empty reason is required.
pub async fn reject(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: RejectParams = serde_json::from_value(params)?;
    let storage = ffe_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: ffe item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let item = storage.reject(&p.id, &p.reason).await?;
    ctx.broadcaster.broadcast(
        "ffe.rejected",
        json!({ "itemId": item.id, "projectId": item.project_id }),
    );
    Ok(serde_json::to_value(&item)?)
}

/// `ffe.delete` — soft delete.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = ffe_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: ffe item {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    if !storage.delete(&p.id).await? {
        anyhow::bail!("NOT_FOUND: ffe item {}", p.id);
    }
    ctx.broadcaster.broadcast(
        "ffe.deleted",
        json!({ "itemId": p.id, "projectId": existing.project_id }),
    );
    Ok(json!({ "deleted": true }))
}
