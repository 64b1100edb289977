/// Task comments
///
/// Comments are immutable: there is no edit or delete operation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE comments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     author_id UUID NOT NULL REFERENCES users(id),
///     content TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// A comment with its author's username resolved for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        task_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (task_id, author_id, content)
                VALUES ($1, $2, $3)
                RETURNING id, task_id, author_id, content, created_at
            )
            SELECT i.id, i.task_id, i.author_id, u.username AS author_username,
                   i.content, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(task_id)
        .bind(author_id)
        .bind(content)
        .fetch_one(executor)
        .await
    }

    /// Comments on a task, oldest first
    pub async fn list_for_task<'e, E: PgExecutor<'e>>(
        executor: E,
        task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.task_id, c.author_id, u.username AS author_username,
                   c.content, c.created_at
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.task_id = $1
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(task_id)
        .fetch_all(executor)
        .await
    }
}
