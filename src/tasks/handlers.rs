//! Task and milestone RPC handlers.

use crate::notifications::storage::NotificationStorage;
use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{CreateTaskParams, TaskFilter, UpdateTaskParams};
use super::storage::TaskStorage;

fn task_storage(ctx: &AppContext) -> TaskStorage {
    TaskStorage::new(ctx.storage.pool())
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
    title: String,
    description: Option<String>,
    priority: Option<String>,
    #[serde(rename = "assigneeId")]
    assignee_id: Option<String>,
    #[serde(rename = "plannedStart")]
    planned_start: Option<String>,
    #[serde(rename = "plannedEnd")]
    planned_end: Option<String>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    status: Option<String>,
    #[serde(rename = "assigneeId")]
    assignee_id: Option<String>,
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
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    #[serde(rename = "assigneeId")]
    assignee_id: Option<String>,
    #[serde(rename = "plannedStart")]
    planned_start: Option<String>,
    #[serde(rename = "plannedEnd")]
    planned_end: Option<String>,
    #[serde(rename = "actualStart")]
    actual_start: Option<String>,
    #[serde(rename = "actualEnd")]
    actual_end: Option<String>,
    progress: Option<i64>,
    #[serde(rename = "actualCostCents")]
    actual_cost_cents: Option<i64>,
}

#[derive(Deserialize)]
struct MilestoneCreateParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    title: String,
    #[serde(rename = "dueDate")]
    due_date: Option<String>,
}

#[derive(Deserialize)]
struct MilestoneListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
}

async fn notify_assignee(ctx: &AppContext, assignee_id: &str, task_title: &str, task_id: &str) {
    let result = NotificationStorage::new(ctx.storage.pool())
        .notify(
            assignee_id,
            "task_assigned",
            "Task assigned to you",
            task_title,
            Some("task"),
            Some(task_id),
        )
        .await;
    if let Err(e) = result {
        tracing::warn!("failed to record assignment notification: {e:#}");
    }
}

/// `task.create`
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    if let Some(assignee) = &p.assignee_id {
        user_storage(ctx).require_actor(assignee).await?;
    }

    let task = task_storage(ctx)
        .create(CreateTaskParams {
            project_id: p.project_id,
            title: p.title,
            description: p.description,
            priority: p.priority,
            assignee_id: p.assignee_id,
            planned_start: p.planned_start,
            planned_end: p.planned_end,
        })
        .await?;

    if let Some(assignee) = &task.assignee_id {
        notify_assignee(ctx, assignee, &task.title, &task.id).await;
    }
    ctx.broadcaster.broadcast(
        "task.created",
        json!({ "taskId": task.id, "projectId": task.project_id }),
    );
    Ok(serde_json::to_value(&task)?)
}

/// `task.list` — optional status/assignee filters.
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let tasks = task_storage(ctx)
        .list(&TaskFilter {
            project_id: p.project_id,
            status: p.status,
            assignee_id: p.assignee_id,
        })
        .await?;
    Ok(json!({ "tasks": tasks }))
}

/// `task.get`
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = task_storage(ctx);
    let Some(task) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: task {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &task.project_id)
        .await?;
    Ok(serde_json::to_value(&task)?)
}

/// `task.update`
pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let storage = task_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: task {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;
    if let Some(assignee) = &p.assignee_id {
        user_storage(ctx).require_actor(assignee).await?;
    }

    let newly_assigned = p.assignee_id.is_some() && p.assignee_id != existing.assignee_id;
    let task = storage
        .update(
            &p.id,
            UpdateTaskParams {
                title: p.title,
                description: p.description,
                status: p.status,
                priority: p.priority,
                assignee_id: p.assignee_id,
                planned_start: p.planned_start,
                planned_end: p.planned_end,
                actual_start: p.actual_start,
                actual_end: p.actual_end,
                progress: p.progress,
                actual_cost_cents: p.actual_cost_cents,
            },
        )
        .await?;

    if newly_assigned {
        if let Some(assignee) = &task.assignee_id {
            notify_assignee(ctx, assignee, &task.title, &task.id).await;
        }
    }
    ctx.broadcaster.broadcast(
        "task.updated",
        json!({ "taskId": task.id, "projectId": task.project_id, "status": task.status }),
    );
    Ok(serde_json::to_value(&task)?)
}

/// `task.delete` — soft delete.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = task_storage(ctx);
    let Some(task) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: task {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &task.project_id)
        .await?;

    if !storage.delete(&p.id).await? {
        anyhow::bail!("NOT_FOUND: task {}", p.id);
    }
    ctx.broadcaster.broadcast(
        "task.deleted",
        json!({ "taskId": p.id, "projectId": task.project_id }),
    );
    Ok(json!({ "deleted": true }))
}

/// `milestone.create`
pub async fn milestone_create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: MilestoneCreateParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let milestone = task_storage(ctx)
        .create_milestone(&p.project_id, &p.title, p.due_date.as_deref())
        .await?;
    ctx.broadcaster.broadcast(
        "milestone.created",
        json!({ "milestoneId": milestone.id, "projectId": milestone.project_id }),
    );
    Ok(serde_json::to_value(&milestone)?)
}

/// `milestone.list`
pub async fn milestone_list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: MilestoneListParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let milestones = task_storage(ctx).list_milestones(&p.project_id).await?;
    Ok(json!({ "milestones": milestones }))
}

/// `milestone.complete`
pub async fn milestone_complete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = task_storage(ctx);
    let Some(existing) = storage.get_milestone(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: milestone {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;
    let milestone = storage.complete_milestone(&p.id).await?;
    ctx.broadcaster.broadcast(
        "milestone.completed",
        json!({ "milestoneId": milestone.id, "projectId": milestone.project_id }),
    );
    Ok(serde_json::to_value(&milestone)?)
}

/// `milestone.delete`
pub async fn milestone_delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = task_storage(ctx);
    let Some(existing) = storage.get_milestone(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: milestone {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;
    storage.delete_milestone(&p.id).await?;
    ctx.broadcaster.broadcast(
        "milestone.deleted",
        json!({ "milestoneId": p.id, "projectId": existing.project_id }),
    );
    Ok(json!({ "deleted": true }))
}
