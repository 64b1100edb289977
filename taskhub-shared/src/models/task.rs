/// Task model and database operations
///
/// Tasks belong to exactly one project. A task is visible to (and may be
/// edited by) its assignee and every member of its project.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('todo', 'in_progress', 'done');
/// CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     status task_status NOT NULL DEFAULT 'todo',
///     priority task_priority NOT NULL DEFAULT 'medium',
///     due_date TIMESTAMPTZ,
///     assigned_to_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Wire names
///
/// Statuses serialize as `ToDo`, `InProgress` and `Done`. Older clients send
/// `Pending`, `In Progress` and `Completed`; those are accepted on input.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use super::user::escape_like;

/// Workflow status of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    #[default]
    #[sqlx(rename = "todo")]
    #[serde(rename = "ToDo", alias = "Pending", alias = "Todo")]
    ToDo,

    #[sqlx(rename = "in_progress")]
    #[serde(rename = "InProgress", alias = "In Progress")]
    InProgress,

    #[sqlx(rename = "done")]
    #[serde(rename = "Done", alias = "Completed")]
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "ToDo",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
    /// Creator; `None` only if that account row was removed out of band
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
}

/// Full replacement of a task's editable fields. The project never changes.
#[derive(Debug, Clone)]
pub struct UpdateTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
}

/// Optional list filters, combined with AND
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Matches tasks due at any time on this UTC calendar day
    pub due_date: Option<NaiveDate>,
    /// Case-insensitive substring over title and description
    pub search: Option<String>,
}

/// How a user relates to a task, loaded for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct TaskAccess {
    pub project_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    /// Member or owner of the task's project
    pub is_member: bool,
}

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, due_date, \
                            assigned_to_id, created_by, created_at, updated_at";

const TASK_COLUMNS_T: &str = "t.id, t.project_id, t.title, t.description, t.status, t.priority, \
                              t.due_date, t.assigned_to_id, t.created_by, t.created_at, t.updated_at";

impl Task {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        created_by: Uuid,
        data: CreateTask,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (project_id, title, description, status, priority,
                               due_date, assigned_to_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(data.project_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.due_date)
        .bind(data.assigned_to_id)
        .bind(created_by)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists tasks visible to `user_id` that match `filter`.
    ///
    /// Visibility is always applied first: the user must be assigned to the
    /// task or belong to (or own) its project. A filter naming a project the
    /// user cannot see therefore yields an empty list, not an error.
    pub async fn list_visible<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM tasks t WHERE (t.assigned_to_id = ",
            TASK_COLUMNS_T
        ));
        qb.push_bind(user_id);
        qb.push(" OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = t.project_id AND pm.user_id = ");
        qb.push_bind(user_id);
        qb.push(") OR EXISTS (SELECT 1 FROM projects p WHERE p.id = t.project_id AND p.owner_id = ");
        qb.push_bind(user_id);
        qb.push("))");

        if let Some(project_id) = filter.project_id {
            qb.push(" AND t.project_id = ").push_bind(project_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND t.status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND t.priority = ").push_bind(priority);
        }
        if let Some(day) = filter.due_date {
            let (start, end) = day_bounds(day);
            qb.push(" AND t.due_date >= ").push_bind(start);
            qb.push(" AND t.due_date < ").push_bind(end);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (t.title ILIKE ").push_bind(pattern.clone());
            qb.push(" OR t.description ILIKE ").push_bind(pattern);
            qb.push(")");
        }

        qb.push(" ORDER BY t.created_at, t.id");

        qb.build_query_as::<Task>().fetch_all(executor).await
    }

    /// Replaces the editable fields. Returns `None` if the task doesn't exist.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, status = $4, priority = $5,
                due_date = $6, assigned_to_id = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.due_date)
        .bind(data.assigned_to_id)
        .fetch_optional(executor)
        .await
    }

    /// Hard delete; comments and attachments cascade. Returns whether a row was removed.
    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn access_for<'e, E: PgExecutor<'e>>(
        executor: E,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TaskAccess>, sqlx::Error> {
        sqlx::query_as::<_, TaskAccess>(
            r#"
            SELECT t.project_id, t.assigned_to_id,
                   (p.owner_id = $2 OR EXISTS (
                       SELECT 1 FROM project_members pm
                       WHERE pm.project_id = t.project_id AND pm.user_id = $2
                   )) AS is_member
            FROM tasks t
            JOIN projects p ON p.id = t.project_id
            WHERE t.id = $1
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}

/// Half-open UTC interval `[day 00:00, next day 00:00)`
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}
