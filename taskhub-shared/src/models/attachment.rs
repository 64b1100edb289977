/// File attachments on tasks
///
/// Only metadata lives in the database; the bytes are written by the API's
/// storage layer and `storage_path` points at them. The path is internal and
/// is not serialized to clients.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE attachments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     file_name VARCHAR(255) NOT NULL,
///     storage_path TEXT NOT NULL,
///     content_type VARCHAR(255),
///     size_bytes BIGINT NOT NULL,
///     uploaded_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub file_name: String,

    #[serde(skip_serializing, default)]
    pub storage_path: String,

    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAttachment {
    /// Pre-generated so the storage layer can name the file before the row exists
    pub id: Uuid,
    pub task_id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
}

const ATTACHMENT_COLUMNS: &str =
    "id, task_id, file_name, storage_path, content_type, size_bytes, uploaded_by, uploaded_at";

impl Attachment {
    pub async fn create<'e, E: PgExecutor<'e>>(executor: E, data: CreateAttachment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO attachments (id, task_id, file_name, storage_path, content_type, size_bytes, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(data.id)
        .bind(data.task_id)
        .bind(data.file_name)
        .bind(data.storage_path)
        .bind(data.content_type)
        .bind(data.size_bytes)
        .bind(data.uploaded_by)
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_task<'e, E: PgExecutor<'e>>(
        executor: E,
        task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE task_id = $1 ORDER BY uploaded_at, id",
            ATTACHMENT_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(executor)
        .await
    }
}
