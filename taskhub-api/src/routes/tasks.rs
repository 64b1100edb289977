/// Task, comment and attachment endpoints
///
/// Mutations follow one sequence: authorize, take the project's publish
/// permit, commit, publish, respond. Holding the permit across commit and
/// publish keeps events on a project topic in commit order.
///
/// # Endpoints
///
/// - `GET    /tasks` - Visible tasks, filtered by query parameters
/// - `POST   /tasks` - Create a task in a project the caller belongs to
/// - `GET    /tasks/:id` - Task with its comments and attachments
/// - `PUT    /tasks/:id` - Replace a task's editable fields
/// - `DELETE /tasks/:id` - Delete a task
/// - `GET    /tasks/:id/comments` - Comments, oldest first
/// - `POST   /tasks/:id/comments` - Add a comment (project members only)
/// - `POST   /tasks/:id/attachments` - Upload a file (project members only)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use taskhub_shared::{
    auth::{
        authorization::{require_project_access, require_task_permission, TaskPermission},
        middleware::AuthContext,
    },
    models::{
        attachment::{Attachment, CreateAttachment},
        comment::Comment,
        task::{CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, UpdateTask},
        user::User,
    },
    notify::persist_comment_notifications,
    realtime::ServerMessage,
};
use uuid::Uuid;
use validator::Validate;

const MAX_FILE_NAME_CHARS: usize = 255;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub project_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub priority: TaskPriority,

    pub due_date: Option<DateTime<Utc>>,

    pub assigned_to_id: Option<Uuid>,
}

/// Update task request. Omitted optional fields are cleared.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub priority: TaskPriority,

    pub due_date: Option<DateTime<Utc>>,

    pub assigned_to_id: Option<Uuid>,
}

/// `GET /tasks` query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// `YYYY-MM-DD`, matched as a UTC calendar day
    pub due_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl From<ListTasksQuery> for TaskFilter {
    fn from(query: ListTasksQuery) -> Self {
        TaskFilter {
            project_id: query.project_id,
            status: query.status,
            priority: query.priority,
            due_date: query.due_date,
            search: query.search,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub content: String,
}

/// Task with its comments and attachments
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
}

fn task_not_found() -> ApiError {
    ApiError::NotFound("Task not found".to_string())
}

/// An assignee, when given, must be an existing user.
async fn ensure_assignee_exists(state: &AppState, assigned_to_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(user_id) = assigned_to_id {
        if !User::exists(&state.db, user_id).await? {
            return Err(ApiError::invalid("assignedToId", "Assigned user does not exist"));
        }
    }
    Ok(())
}

/// List visible tasks
///
/// ```text
/// GET /tasks?projectId=…&status=InProgress&priority=High&dueDate=2025-03-01&search=deploy
/// ```
///
/// All filters are optional and combine with AND. The result never contains
/// a task the caller can't see; filtering by a foreign project yields `[]`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppQuery(query): AppQuery<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = Task::list_visible(&state.db, auth.user_id, &query.into()).await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
) -> ApiResult<Json<TaskDetail>> {
    require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::View).await?;

    let task = Task::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(task_not_found)?;
    let comments = Comment::list_for_task(&state.db, task_id).await?;
    let attachments = Attachment::list_for_task(&state.db, task_id).await?;

    Ok(Json(TaskDetail {
        task,
        comments,
        attachments,
    }))
}

/// Create a task
///
/// ```text
/// POST /tasks
/// {
///   "projectId": "…",
///   "title": "Write release notes",
///   "status": "ToDo",
///   "priority": "High",
///   "dueDate": "2025-03-01T17:00:00Z",
///   "assignedToId": "…"
/// }
/// ```
///
/// Responds 201 with the task and publishes `TaskCreated` to the project.
///
/// # Errors
///
/// - `400 Bad Request`: validation failed or unknown assignee
/// - `404 Not Found`: project doesn't exist or caller isn't a member
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;
    require_project_access(&state.db, req.project_id, auth.user_id).await?;
    ensure_assignee_exists(&state, req.assigned_to_id).await?;

    let _permit = state.hub.sequence(req.project_id).await;

    let task = Task::create(
        &state.db,
        auth.user_id,
        CreateTask {
            project_id: req.project_id,
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            assigned_to_id: req.assigned_to_id,
        },
    )
    .await?;

    tracing::info!(task_id = %task.id, project_id = %task.project_id, user_id = %auth.user_id, "Task created");

    state
        .hub
        .publish(task.project_id, &ServerMessage::TaskCreated(task.clone()))
        .await;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Replace a task's editable fields
///
/// Allowed for the assignee and project members. Publishes `TaskUpdated`
/// with the new status and full task.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;
    let access = require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::Modify).await?;
    ensure_assignee_exists(&state, req.assigned_to_id).await?;

    let _permit = state.hub.sequence(access.project_id).await;

    let task = Task::update(
        &state.db,
        task_id,
        UpdateTask {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            assigned_to_id: req.assigned_to_id,
        },
    )
    .await?
    .ok_or_else(task_not_found)?;

    tracing::info!(task_id = %task.id, status = task.status.as_str(), user_id = %auth.user_id, "Task updated");

    state
        .hub
        .publish(task.project_id, &ServerMessage::task_updated(task.clone()))
        .await;

    Ok(Json(task))
}

/// Delete a task
///
/// Comments and attachment rows cascade; stored attachment files are removed
/// after the commit on a best-effort basis. Responds 204 and publishes
/// `TaskDeleted`.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
) -> ApiResult<StatusCode> {
    let access = require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::Modify).await?;

    let _permit = state.hub.sequence(access.project_id).await;

    let attachments = Attachment::list_for_task(&state.db, task_id).await?;

    if !Task::delete(&state.db, task_id).await? {
        return Err(task_not_found());
    }

    tracing::info!(task_id = %task_id, user_id = %auth.user_id, "Task deleted");

    state
        .hub
        .publish(access.project_id, &ServerMessage::TaskDeleted { task_id })
        .await;

    for attachment in attachments {
        if let Err(e) = state.storage.remove(&attachment.storage_path).await {
            tracing::warn!(
                attachment_id = %attachment.id,
                error = %e,
                "Failed to remove attachment file of deleted task"
            );
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::View).await?;

    let comments = Comment::list_for_task(&state.db, task_id).await?;
    Ok(Json(comments))
}

/// Add a comment
///
/// ```text
/// POST /tasks/:id/comments
/// { "content": "Looks good" }
/// ```
///
/// The comment and any notifications it triggers are written in one
/// transaction. After commit, `CommentAdded` goes to the project topic and
/// each notification is pushed to its recipient.
///
/// # Errors
///
/// - `400 Bad Request`: empty content
/// - `403 Forbidden`: caller is the assignee but not a project member
/// - `404 Not Found`: task doesn't exist or isn't visible
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
    AppJson(req): AppJson<AddCommentRequest>,
) -> ApiResult<Json<Comment>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::invalid("content", "Content is required"));
    }

    let access = require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::Contribute).await?;

    let _permit = state.hub.sequence(access.project_id).await;

    let mut tx = state.db.begin().await?;

    let task = Task::find_by_id(&mut *tx, task_id)
        .await?
        .ok_or_else(task_not_found)?;
    let comment = Comment::create(&mut *tx, task_id, auth.user_id, content).await?;
    let notifications = persist_comment_notifications(&mut *tx, &task, auth.user_id).await?;

    tx.commit().await?;

    tracing::info!(
        comment_id = %comment.id,
        task_id = %task_id,
        notifications = notifications.len(),
        "Comment added"
    );

    state
        .hub
        .publish(
            access.project_id,
            &ServerMessage::CommentAdded {
                task_id,
                comment: comment.clone(),
            },
        )
        .await;

    state.dispatcher.deliver(&notifications).await;

    Ok(Json(comment))
}

/// Upload an attachment
///
/// ```text
/// POST /tasks/:id/attachments
/// Content-Type: multipart/form-data; boundary=…
///
/// (a part named "file")
/// ```
///
/// Responds with the attachment metadata. The body size limit comes from
/// `MAX_UPLOAD_BYTES`.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(task_id): AppPath<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<Attachment>> {
    require_task_permission(&state.db, task_id, auth.user_id, TaskPermission::Contribute).await?;

    let mut upload: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("file")
            .chars()
            .take(MAX_FILE_NAME_CHARS)
            .collect::<String>();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        upload = Some((file_name, content_type, data));
        break;
    }

    let (file_name, content_type, data) =
        upload.ok_or_else(|| ApiError::invalid("file", "A file part is required"))?;
    if data.is_empty() {
        return Err(ApiError::invalid("file", "File is empty"));
    }

    let attachment_id = Uuid::new_v4();
    let size_bytes = data.len() as i64;
    let storage_path = state.storage.put(task_id, attachment_id, &file_name, data).await?;

    let created = Attachment::create(
        &state.db,
        CreateAttachment {
            id: attachment_id,
            task_id,
            file_name,
            storage_path: storage_path.clone(),
            content_type,
            size_bytes,
            uploaded_by: auth.user_id,
        },
    )
    .await;

    match created {
        Ok(attachment) => {
            tracing::info!(
                attachment_id = %attachment.id,
                task_id = %task_id,
                size_bytes,
                "Attachment uploaded"
            );
            Ok(Json(attachment))
        }
        Err(e) => {
            // No row references the blob; don't leave it behind
            if let Err(cleanup) = state.storage.remove(&storage_path).await {
                tracing::warn!(path = %storage_path, error = %cleanup, "Failed to remove orphaned attachment");
            }
            Err(e.into())
        }
    }
}
