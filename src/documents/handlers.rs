//! Document registry RPC handlers.

use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::RegisterDocumentParams;
use super::storage::DocumentStorage;

fn document_storage(ctx: &AppContext) -> DocumentStorage {
    DocumentStorage::new(ctx.storage.pool())
}

fn user_storage(ctx: &AppContext) -> UserStorage {
    UserStorage::new(ctx.storage.pool())
}

#[derive(Deserialize)]
struct RegisterParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    title: String,
    kind: Option<String>,
    #[serde(rename = "fileName")]
    file_name: String,
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    #[serde(rename = "sizeBytes")]
    size_bytes: Option<i64>,
    #[serde(rename = "storagePath")]
    storage_path: String,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    kind: Option<String>,
}

#[derive(Deserialize)]
struct IdParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
}

#[derive(Deserialize)]
struct NewVersionParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    id: String,
    #[serde(rename = "fileName")]
    file_name: String,
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    #[serde(rename = "sizeBytes")]
    size_bytes: Option<i64>,
    #[serde(rename = "storagePath")]
    storage_path: String,
}

/// `document.register`
pub async fn register(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: RegisterParams = serde_json::from_value(params)?;
    let actor = user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let document = document_storage(ctx)
        .register(RegisterDocumentParams {
            project_id: p.project_id,
            title: p.title,
            kind: p.kind,
            file_name: p.file_name,
            content_type: p.content_type,
            size_bytes: p.size_bytes,
            storage_path: p.storage_path,
            uploaded_by: actor.id,
        })
        .await?;
    ctx.broadcaster.broadcast(
        "document.registered",
        json!({ "documentId": document.id, "projectId": document.project_id }),
    );
    Ok(serde_json::to_value(&document)?)
}

/// `document.list`
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    user_storage(ctx)
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let documents = document_storage(ctx)
        .list(&p.project_id, p.kind.as_deref())
        .await?;
    Ok(json!({ "documents": documents }))
}

/// `document.get`
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = document_storage(ctx);
    let Some(document) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: document {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &document.project_id)
        .await?;
    Ok(serde_json::to_value(&document)?)
}

/// `document.newVersion`
pub async fn new_version(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: NewVersionParams = serde_json::from_value(params)?;
    let storage = document_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: document {}", p.id);
    };
    let actor = user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    let document = storage
        .new_version(
            &p.id,
            &p.file_name,
            p.content_type.as_deref(),
            p.size_bytes.unwrap_or(0),
            &p.storage_path,
            &actor.id,
        )
        .await?;
    ctx.broadcaster.broadcast(
        "document.versionAdded",
        json!({ "documentId": document.id, "projectId": document.project_id, "version": document.version }),
    );
    Ok(serde_json::to_value(&document)?)
}

/// `document.delete` — soft delete.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = document_storage(ctx);
    let Some(existing) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: document {}", p.id);
    };
    user_storage(ctx)
        .require_project_access(&p.actor_id, &existing.project_id)
        .await?;

    if !storage.delete(&p.id).await? {
        anyhow::bail!("NOT_FOUND: document {}", p.id);
    }
    ctx.broadcaster.broadcast(
        "document.deleted",
        json!({ "documentId": p.id, "projectId": existing.project_id }),
    );
    Ok(json!({ "deleted": true }))
}
