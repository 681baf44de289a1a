//! Project RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{CreateProjectParams, UpdateProjectParams};
use super::storage::ProjectStorage;

fn project_storage(ctx: &AppContext) -> ProjectStorage {
    ProjectStorage::new(ctx.storage.pool())
}

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct CreateParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    name: String,
    #[serde(rename = "clientName")]
    client_name: Option<String>,
    #[serde(rename = "siteAddress")]
    site_address: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    #[serde(rename = "budgetTotalCents")]
    budget_total_cents: Option<i64>,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct ActorParams {
    #[serde(rename = "actorId")]
    actor_id: String,
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
    #[serde(rename = "clientName")]
    client_name: Option<String>,
    #[serde(rename = "siteAddress")]
    site_address: Option<String>,
    status: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    #[serde(rename = "budgetTotalCents")]
    budget_total_cents: Option<i64>,
    progress: Option<i64>,
}

/// `project.create` — any known user may open a project; they become its owner.
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let actor = user_storage(ctx).require_actor(&p.actor_id).await?;

    let project = project_storage(ctx)
        .create(CreateProjectParams {
            name: p.name,
            client_name: p.client_name,
            site_address: p.site_address,
            start_date: p.start_date,
            end_date: p.end_date,
            budget_total_cents: p.budget_total_cents.unwrap_or(0),
            currency: p.currency,
            owner_id: actor.id,
        })
        .await?;

    ctx.broadcaster.broadcast(
        "project.created",
        json!({ "projectId": project.id, "name": project.name }),
    );
    Ok(serde_json::to_value(&project)?)
}

/// `project.list` — admins see everything, members only their own projects.
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ActorParams = serde_json::from_value(params)?;
    let actor = user_storage(ctx).require_actor(&p.actor_id).await?;
    let scope = if actor.is_admin() {
        None
    } else {
        Some(actor.id.as_str())
    };
    let projects = project_storage(ctx).list(scope).await?;
    Ok(json!({ "projects": projects }))
}

/// `project.get`
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.id)
        .await?;
    match project_storage(ctx).get(&p.id).await? {
        Some(project) => Ok(serde_json::to_value(&project)?),
        None => anyhow::bail!("NOT_FOUND: project {}", p.id),
    }
}

/// `project.update` — partial update of mutable fields.
pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.id)
        .await?;

    let project = project_storage(ctx)
        .update(
            &p.id,
            UpdateProjectParams {
                name: p.name,
                client_name: p.client_name,
                site_address: p.site_address,
                status: p.status,
                start_date: p.start_date,
                end_date: p.end_date,
                budget_total_cents: p.budget_total_cents,
                progress: p.progress,
            },
        )
        .await?;

    ctx.broadcaster.broadcast(
        "project.updated",
        json!({ "projectId": project.id, "status": project.status }),
    );
    Ok(serde_json::to_value(&project)?)
}

/// `project.archive` — shorthand for setting the archived status.
pub async fn archive(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.id)
        .await?;

    let project = project_storage(ctx).set_status(&p.id, "archived").await?;
    ctx.broadcaster
        .broadcast("project.updated", json!({ "projectId": project.id, "status": "archived" }));
    Ok(serde_json::to_value(&project)?)
}

/// `project.delete` — soft delete; the row is hidden, not destroyed.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.id)
        .await?;

    let deleted = project_storage(ctx).delete(&p.id).await?;
    if !deleted {
        anyhow::bail!("NOT_FOUND: project {}", p.id);
    }
    ctx.broadcaster
        .broadcast("project.deleted", json!({ "projectId": p.id }));
    Ok(json!({ "deleted": true }))
}
