//! `daemon.*` handlers.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let (projects,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM projects WHERE deleted_at IS NULL")
            .fetch_one(&ctx.storage.pool())
            .await?;
    let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&ctx.storage.pool())
        .await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "port": ctx.config.port,
        "projects": projects,
        "users": users,
    }))
}
