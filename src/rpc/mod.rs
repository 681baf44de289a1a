pub mod auth;
pub mod client;
pub mod daemon;
pub mod event;

use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const NOT_FOUND: i32 = -32001;
const FORBIDDEN: i32 = -32003;
const UNAUTHORIZED: i32 = -32004;
const INVALID_TRANSITION: i32 = -32005;

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "RPC server listening (WebSocket + HTTP health on same port)");

    ctx.broadcaster.broadcast(
        "daemon.ready",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": ctx.config.port
        }),
    );

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping RPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("RPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (any GET /health is fine)
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from
    // WebSocket upgrades, which share the port. "GET /health" is answered
    // directly; everything else falls through to the WS handshake.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // ── Auth challenge ───────────────────────────────────────────────────────
    // The first message from every client must be a `daemon.auth` RPC call
    // carrying the correct token. This prevents other local processes from
    // connecting to the daemon and issuing arbitrary RPC commands.
    if !ctx.auth_token.is_empty() {
        let first = tokio::time::timeout(std::time::Duration::from_secs(10), stream.next()).await;

        let text = match first {
            Ok(Some(Ok(Message::Text(t)))) => t,
            // Timeout, connection closed, or non-text frame — reject silently.
            _ => return Ok(()),
        };

        let req: RpcRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) => {
                let _ = sink
                    .send(Message::Text(error_response(
                        Value::Null,
                        PARSE_ERROR,
                        "Parse error",
                    )))
                    .await;
                return Ok(());
            }
        };

        let id = req.id.clone().unwrap_or(Value::Null);

        if req.method != "daemon.auth" {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — send daemon.auth first",
                )))
                .await;
            return Ok(());
        }

        let provided = req
            .params
            .as_ref()
            .and_then(|p| p.get("token"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if provided != ctx.auth_token {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — invalid token",
                )))
                .await;
            return Ok(());
        }

        let resp = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "authenticated": true }
        });
        let _ = sink.send(Message::Text(resp.to_string())).await;
        debug!("client authenticated");
    }

    let mut broadcast_rx = ctx.broadcaster.subscribe();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_text(&text, &ctx).await;
                        if let Err(e) = sink.send(Message::Text(response)).await {
                            warn!(err = %e, "send error");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast event
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    match dispatch(&req.method, params, ctx).await {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            let (code, msg) = classify_error(&e);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    use crate::{ai, baseline, budget, documents, ffe, notifications, procurement, projects, tasks, users};

    match method {
        "daemon.ping" => daemon::ping(params, ctx).await,
        "daemon.status" => daemon::status(params, ctx).await,

        "user.create" => users::handlers::create(params, ctx).await,
        "user.list" => users::handlers::list(params, ctx).await,
        "user.get" => users::handlers::get(params, ctx).await,

        "project.create" => projects::handlers::create(params, ctx).await,
        "project.list" => projects::handlers::list(params, ctx).await,
        "project.get" => projects::handlers::get(params, ctx).await,
        "project.update" => projects::handlers::update(params, ctx).await,
        "project.archive" => projects::handlers::archive(params, ctx).await,
        "project.delete" => projects::handlers::delete(params, ctx).await,

        "task.create" => tasks::handlers::create(params, ctx).await,
        "task.list" => tasks::handlers::list(params, ctx).await,
        "task.get" => tasks::handlers::get(params, ctx).await,
        "task.update" => tasks::handlers::update(params, ctx).await,
        "task.delete" => tasks::handlers::delete(params, ctx).await,
        "milestone.create" => tasks::handlers::milestone_create(params, ctx).await,
        "milestone.list" => tasks::handlers::milestone_list(params, ctx).await,
        "milestone.complete" => tasks::handlers::milestone_complete(params, ctx).await,
        "milestone.delete" => tasks::handlers::milestone_delete(params, ctx).await,

        "budget.addExpense" => budget::handlers::add_expense(params, ctx).await,
        "budget.listExpenses" => budget::handlers::list_expenses(params, ctx).await,
        "budget.updateExpense" => budget::handlers::update_expense(params, ctx).await,
        "budget.deleteExpense" => budget::handlers::delete_expense(params, ctx).await,
        "budget.summary" => budget::handlers::summary(params, ctx).await,

        "procurement.create" => procurement::handlers::create(params, ctx).await,
        "procurement.list" => procurement::handlers::list(params, ctx).await,
        "procurement.get" => procurement::handlers::get(params, ctx).await,
        "procurement.update" => procurement::handlers::update(params, ctx).await,
        "procurement.setStatus" => procurement::handlers::set_status(params, ctx).await,
        "procurement.delete" => procurement::handlers::delete(params, ctx).await,
        "procurement.boqSummary" => procurement::handlers::boq_summary(params, ctx).await,

        "ffe.create" => ffe::handlers::create(params, ctx).await,
        "ffe.list" => ffe::handlers::list(params, ctx).await,
        "ffe.update" => ffe::handlers::update(params, ctx).await,
        "ffe.approve" => ffe::handlers::approve(params, ctx).await,
        "ffe.reject" => ffe::handlers::reject(params, ctx).await,
        "ffe.delete" => ffe::handlers::delete(params, ctx).await,

        "baseline.capture" => baseline::handlers::capture(params, ctx).await,
        "baseline.list" => baseline::handlers::list(params, ctx).await,
        "baseline.get" => baseline::handlers::get(params, ctx).await,
        "baseline.compare" => baseline::handlers::compare(params, ctx).await,

        "document.register" => documents::handlers::register(params, ctx).await,
        "document.list" => documents::handlers::list(params, ctx).await,
        "document.get" => documents::handlers::get(params, ctx).await,
        "document.newVersion" => documents::handlers::new_version(params, ctx).await,
        "document.delete" => documents::handlers::delete(params, ctx).await,

        "notification.list" => notifications::handlers::list(params, ctx).await,
        "notification.unreadCount" => notifications::handlers::unread_count(params, ctx).await,
        "notification.markRead" => notifications::handlers::mark_read(params, ctx).await,
        "notification.markAllRead" => notifications::handlers::mark_all_read(params, ctx).await,

        "ai.generateReport" => ai::handlers::generate_report(params, ctx).await,
        "ai.listReports" => ai::handlers::list_reports(params, ctx).await,
        "ai.getReport" => ai::handlers::get_report(params, ctx).await,

        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error) -> (i32, String) {
    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.starts_with("NOT_FOUND:") {
        return (NOT_FOUND, msg);
    }
    if msg.starts_with("FORBIDDEN:") {
        return (FORBIDDEN, msg);
    }
    if msg.starts_with("INVALID_TRANSITION:") {
        return (INVALID_TRANSITION, msg);
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = format!("{e:#}"), "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::storage::Storage;

    async fn test_ctx() -> AppContext {
        AppContext {
            config: DaemonConfig::default(),
            storage: Storage::in_memory().await.unwrap(),
            broadcaster: event::EventBroadcaster::new(),
            auth_token: String::new(),
            started_at: std::time::Instant::now(),
        }
    }

    async fn call(ctx: &AppContext, method: &str, params: Value) -> Value {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });
        let resp = dispatch_text(&req.to_string(), ctx).await;
        serde_json::from_str(&resp).unwrap()
    }

    #[tokio::test]
    async fn test_parse_error() {
        let ctx = test_ctx().await;
        let resp: Value = serde_json::from_str(&dispatch_text("not json", &ctx).await).unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let ctx = test_ctx().await;
        let req = r#"{"jsonrpc":"1.0","id":1,"method":"daemon.ping"}"#;
        let resp: Value = serde_json::from_str(&dispatch_text(req, &ctx).await).unwrap();
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let ctx = test_ctx().await;
        let resp = call(&ctx, "does.notExist", Value::Null).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ping() {
        let ctx = test_ctx().await;
        let resp = call(&ctx, "daemon.ping", Value::Null).await;
        assert_eq!(resp["result"]["pong"], true);
    }

    #[tokio::test]
    async fn test_missing_params_maps_to_invalid_params() {
        let ctx = test_ctx().await;
        let resp = call(&ctx, "project.create", serde_json::json!({})).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_not_found_marker() {
        let ctx = test_ctx().await;
        // Bootstrap a user, then look up a project that doesn't exist
        let user = call(
            &ctx,
            "user.create",
            serde_json::json!({ "name": "A", "email": "a@studio.io" }),
        )
        .await;
        let actor_id = user["result"]["id"].as_str().unwrap();
        let resp = call(
            &ctx,
            "project.get",
            serde_json::json!({ "actorId": actor_id, "id": "missing" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forbidden_marker() {
        let ctx = test_ctx().await;
        // First user bootstraps; grant them member role so they can't list users
        let user = call(
            &ctx,
            "user.create",
            serde_json::json!({ "name": "A", "email": "a@studio.io", "role": "member" }),
        )
        .await;
        let actor_id = user["result"]["id"].as_str().unwrap();
        let resp = call(&ctx, "user.list", serde_json::json!({ "actorId": actor_id })).await;
        assert_eq!(resp["error"]["code"], FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_transition_marker() {
        let ctx = test_ctx().await;
        let user = call(
            &ctx,
            "user.create",
            serde_json::json!({ "name": "A", "email": "a@studio.io" }),
        )
        .await;
        let actor_id = user["result"]["id"].as_str().unwrap().to_string();
        let project = call(
            &ctx,
            "project.create",
            serde_json::json!({ "actorId": actor_id, "name": "Fitout" }),
        )
        .await;
        let project_id = project["result"]["id"].as_str().unwrap().to_string();
        let item = call(
            &ctx,
            "procurement.create",
            serde_json::json!({ "actorId": actor_id, "projectId": project_id, "name": "Tiles" }),
        )
        .await;
        let item_id = item["result"]["id"].as_str().unwrap();
        let resp = call(
            &ctx,
            "procurement.setStatus",
            serde_json::json!({ "actorId": actor_id, "id": item_id, "status": "installed" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], INVALID_TRANSITION);
    }

    #[tokio::test]
    async fn test_end_to_end_task_flow() {
        let ctx = test_ctx().await;
        let user = call(
            &ctx,
            "user.create",
            serde_json::json!({ "name": "A", "email": "a@studio.io" }),
        )
        .await;
        let actor_id = user["result"]["id"].as_str().unwrap().to_string();
        let project = call(
            &ctx,
            "project.create",
            serde_json::json!({ "actorId": actor_id, "name": "Fitout", "budgetTotalCents": 500000 }),
        )
        .await;
        let project_id = project["result"]["id"].as_str().unwrap().to_string();

        let task = call(
            &ctx,
            "task.create",
            serde_json::json!({ "actorId": actor_id, "projectId": project_id, "title": "Paint" }),
        )
        .await;
        let task_id = task["result"]["id"].as_str().unwrap();

        let done = call(
            &ctx,
            "task.update",
            serde_json::json!({ "actorId": actor_id, "id": task_id, "status": "done" }),
        )
        .await;
        assert_eq!(done["result"]["progress"], 100);

        let listed = call(
            &ctx,
            "task.list",
            serde_json::json!({ "actorId": actor_id, "projectId": project_id, "status": "done" }),
        )
        .await;
        assert_eq!(listed["result"]["tasks"].as_array().unwrap().len(), 1);
    }
}
