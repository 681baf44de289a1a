//! Baseline RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::storage::BaselineStorage;

fn baseline_storage(ctx: &AppContext) -> BaselineStorage {
    BaselineStorage::new(ctx.storage.pool())
}

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct CaptureParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    name: String,
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

/// `baseline.capture`
pub async fn capture(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CaptureParams = serde_json::from_value(params)?;
    let actor = user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let baseline = baseline_storage(ctx)
        .capture(&p.project_id, &p.name, &actor.id)
        .await?;
    ctx.broadcaster.broadcast(
        "baseline.captured",
        json!({ "baselineId": baseline.id, "projectId": baseline.project_id, "version": baseline.version }),
    );
    Ok(serde_json::to_value(&baseline)?)
}

/// `baseline.list`
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ProjectParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let baselines = baseline_storage(ctx).list(&p.project_id).await?;
    Ok(json!({ "baselines": baselines }))
}

/// `baseline.get` — baseline row plus its snapshots.
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = baseline_storage(ctx);
    let Some(baseline) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: baseline {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &baseline.project_id)
        .await?;
    let snapshots = storage.snapshots(&p.id).await?;
    Ok(json!({ "baseline": baseline, "snapshots": snapshots }))
}

/// `baseline.compare` — compute, persist and return the variance set.
pub async fn compare(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = baseline_storage(ctx);
    let Some(baseline) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: baseline {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &baseline.project_id)
        .await?;

    let comparison = storage.compare(&p.id).await?;
    ctx.broadcaster.broadcast(
        "baseline.compared",
        json!({ "baselineId": p.id, "projectId": baseline.project_id }),
    );
    Ok(serde_json::to_value(&comparison)?)
}
