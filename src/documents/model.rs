//! Document registry data model types.

use serde::{Deserialize, Serialize};

/// Registered document metadata. File bytes live outside the daemon; the
/// registry tracks where they are and which revision is current.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub kind: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
    pub version: i64,
    pub uploaded_by: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterDocumentParams {
    pub project_id: String,
    pub title: String,
    pub kind: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub storage_path: String,
    pub uploaded_by: String,
}

pub fn valid_kind(kind: &str) -> bool {
    matches!(
        kind,
        "contract" | "drawing" | "report" | "invoice" | "photo" | "other"
    )
}
