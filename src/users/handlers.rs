//! User RPC handlers.

use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::storage::UserStorage;

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct CreateParams {
    #[serde(rename = "actorId")]
    actor_id: Option<String>,
    name: String,
    email: String,
    role: Option<String>,
}

#[derive(Deserialize)]
struct ActorParams {
    #[serde(rename = "actorId")]
    actor_id: String,
}

#[derive(Deserialize)]
struct GetParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
}

/// `user.create` — admin-only, except for bootstrapping the very first user.
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let storage = user_storage(ctx);

    // The first user may be created without an actor (fresh install).
    let existing = storage.list().await?;
    if !existing.is_empty() {
        let actor_id = p
            .actor_id
            .ok_or_else(|| anyhow::anyhow!("missing field `actorId`"))?;
        let actor = storage.require_actor(&actor_id).await?;
        if !actor.is_admin() {
            anyhow::bail!("FORBIDDEN: only admins may create users");
        }
    }

    let role = p.role.as_deref().unwrap_or(super::model::ROLE_MEMBER);
    let user = storage.create(&p.name, &p.email, role).await?;
    Ok(serde_json::to_value(&user)?)
}

/// `user.list` — admin-only.
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ActorParams = serde_json::from_value(params)?;
    let storage = user_storage(ctx);
    let actor = storage.require_actor(&p.actor_id).await?;
    if !actor.is_admin() {
        anyhow::bail!("FORBIDDEN: only admins may list users");
    }
    let users = storage.list().await?;
    Ok(json!({ "users": users }))
}

/// `user.get` — any authenticated actor may look up a user row.
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: GetParams = serde_json::from_value(params)?;
    let storage = user_storage(ctx);
    storage.require_actor(&p.actor_id).await?;
    match storage.get(&p.id).await? {
        Some(user) => Ok(serde_json::to_value(&user)?),
        None => anyhow::bail!("NOT_FOUND: user {}", p.id),
    }
}
