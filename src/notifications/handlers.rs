//! Notification RPC handlers. All methods operate on the actor's own rows.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::storage::NotificationStorage;

fn notification_storage(ctx: &AppContext) -> NotificationStorage {
    NotificationStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "unreadOnly", default)]
    unread_only: bool,
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

/// `notification.list`
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    let actor = UserStorage::new(ctx.storage.pool())
        .require_actor(&p.actor_id)
        .await?;
    let notifications = notification_storage(ctx)
        .list_for_user(&actor.id, p.unread_only)
        .await?;
    Ok(json!({ "notifications": notifications }))
}

/// `notification.unreadCount`
pub async fn unread_count(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ActorParams = serde_json::from_value(params)?;
    let actor = UserStorage::new(ctx.storage.pool())
        .require_actor(&p.actor_id)
        .await?;
    let count = notification_storage(ctx).unread_count(&actor.id).await?;
    Ok(json!({ "count": count }))
}

/// `notification.markRead`
pub async fn mark_read(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let actor = UserStorage::new(ctx.storage.pool())
        .require_actor(&p.actor_id)
        .await?;
    let notification = notification_storage(ctx).mark_read(&p.id, &actor.id).await?;
    Ok(serde_json::to_value(&notification)?)
}

/// `notification.markAllRead`
pub async fn mark_all_read(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ActorParams = serde_json::from_value(params)?;
    let actor = UserStorage::new(ctx.storage.pool())
        .require_actor(&p.actor_id)
        .await?;
    let marked = notification_storage(ctx).mark_all_read(&actor.id).await?;
    Ok(json!({ "marked": marked }))
}
