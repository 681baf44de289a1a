//! atelierd — fit-out project management daemon.
//!
//! A local daemon that tracks interior fit-out projects end to end:
//! schedules and milestones, budgets and expenses, procurement and FF&E,
//! document revisions, schedule/cost baselines with earned-value variance,
//! and LLM-generated progress reports. Clients talk JSON-RPC 2.0 over a
//! WebSocket on localhost; mutations are pushed to all connected clients
//! as JSON-RPC notifications.

pub mod ai;
pub mod baseline;
pub mod budget;
pub mod config;
pub mod documents;
pub mod ffe;
pub mod notifications;
pub mod procurement;
pub mod projects;
pub mod rpc;
pub mod storage;
pub mod tasks;
pub mod users;

/// Shared state handed to every RPC handler.
pub struct AppContext {
    pub config: config::DaemonConfig,
    pub storage: storage::Storage,
    pub broadcaster: rpc::event::EventBroadcaster,
    pub auth_token: String,
    pub started_at: std::time::Instant,
}
