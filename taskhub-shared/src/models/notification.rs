/// Per-user notifications
///
/// Rows are created by the notification dispatcher and only ever mutated by
/// marking them read. They are never deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     task_id UUID REFERENCES tasks(id) ON DELETE SET NULL,
///     message TEXT NOT NULL,
///     is_read BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, task_id, message, is_read, created_at";

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        task_id: Option<Uuid>,
        message: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO notifications (user_id, task_id, message) VALUES ($1, $2, $3) RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(task_id)
        .bind(message)
        .fetch_one(executor)
        .await
    }

    /// Unread notifications for `user_id`, newest first
    pub async fn list_unread<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications WHERE user_id = $1 AND NOT is_read ORDER BY created_at DESC, id",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Marks a notification read.
    ///
    /// Idempotent: marking an already-read notification returns it unchanged.
    /// Returns `None` when the id doesn't exist or belongs to another user.
    pub async fn mark_read<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}
