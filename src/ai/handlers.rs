//! AI report RPC handlers.

use crate::baseline::storage::BaselineStorage;
use crate::budget::storage::BudgetStorage;
use crate::notifications::storage::NotificationStorage;
use crate::procurement::storage::ProcurementStorage;
use crate::projects::storage::ProjectStorage;
use crate::tasks::storage::TaskStorage;
use crate::users::storage::UserStorage;
use crate::AppContext;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::client::LlmClient;
use super::prompts;
use super::storage::ReportStorage;

#[derive(Deserialize)]
struct GenerateParams {
    #[serde(rename = "actorId")]
    actor_id: String,
    #[serde(rename = "projectId")]
    project_id: String,
    #[serde(rename = "reportType")]
    report_type: String,
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

/// `ai.generateReport` — assemble the project digest, run the completion,
/// store the result verbatim and notify the project owner.
pub async fn generate_report(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: GenerateParams = serde_json::from_value(params)?;
    if !prompts::valid_report_type(&p.report_type) {
        anyhow::bail!("invalid report type: {}", p.report_type);
    }
    let actor = UserStorage::new(ctx.storage.pool())
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;

    // Fails before any data assembly when no key is configured
    let client = LlmClient::from_config(&ctx.config.llm)
        .context("llm is not configured; set [llm].api_key or ATELIERD_LLM_API_KEY")?;

    let pool = ctx.storage.pool();
    let project = ProjectStorage::new(pool.clone())
        .get(&p.project_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("NOT_FOUND: project {}", p.project_id))?;
    let tasks = TaskStorage::new(pool.clone())
        .list_for_project(&p.project_id)
        .await?;
    let budget = BudgetStorage::new(pool.clone()).summary(&p.project_id).await?;
    let procurement = ProcurementStorage::new(pool.clone())
        .list(&p.project_id, None)
        .await?;

    // Variance reports fold in the latest baseline comparison when one exists
    let comparison = if p.report_type == "variance" {
        let baselines = BaselineStorage::new(pool.clone());
        match baselines.list(&p.project_id).await?.first() {
            Some(latest) => Some(baselines.compare(&latest.id).await?),
            None => None,
        }
    } else {
        None
    };

    let messages = prompts::build_messages(
        &p.report_type,
        &project,
        &tasks,
        &budget,
        &procurement,
        comparison.as_ref(),
    );
    let completion = client
        .complete(&messages)
        .await
        .context("chat completion failed")?;

    let report = ReportStorage::new(pool.clone())
        .store(
            &p.project_id,
            &p.report_type,
            &completion.model,
            &completion.content,
            completion.prompt_tokens,
            completion.completion_tokens,
            &actor.id,
        )
        .await?;

    let notify = NotificationStorage::new(pool)
        .notify(
            &project.owner_id,
            "report_ready",
            "AI report ready",
            &format!("{} report for {}", report.report_type, project.name),
            Some("ai_report"),
            Some(&report.id),
        )
        .await;
    if let Err(e) = notify {
        tracing::warn!("failed to record report notification: {e:#}");
    }

    ctx.broadcaster.broadcast(
        "ai.reportGenerated",
        json!({ "reportId": report.id, "projectId": report.project_id, "reportType": report.report_type }),
    );
    Ok(serde_json::to_value(&report)?)
}

/// `ai.listReports`
pub async fn list_reports(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ProjectParams = serde_json::from_value(params)?;
    UserStorage::new(ctx.storage.pool())
        .require_project_access(&p.actor_id, &p.project_id)
        .await?;
    let reports = ReportStorage::new(ctx.storage.pool())
        .list(&p.project_id)
        .await?;
    Ok(json!({ "reports": reports }))
}

/// `ai.getReport`
pub async fn get_report(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let storage = ReportStorage::new(ctx.storage.pool());
    let Some(report) = storage.get(&p.id).await? else {
        anyhow::bail!("NOT_FOUND: report {}", p.id);
    };
    UserStorage::new(ctx.storage.pool())
        .require_project_access(&p.actor_id, &report.project_id)
        .await?;
    Ok(serde_json::to_value(&report)?)
}
