/// Project endpoints
///
/// Every mutation that changes a project's membership publishes
/// `ProjectUpdated` to the project topic and to the affected user's own
/// connections, so a client that just gained access learns about the project
/// and can join its topic.
///
/// # Endpoints
///
/// - `GET  /projects` - Projects the caller owns or belongs to
/// - `POST /projects` - Create a project (caller becomes owner and member)
/// - `GET  /projects/:id` - Single project
/// - `POST /projects/:id/join` - Join a project
/// - `POST /projects/:id/members` - Add a member by username (admin only)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath},
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use taskhub_shared::{
    auth::{
        authorization::{require_project_access, require_role},
        middleware::AuthContext,
    },
    models::{
        membership::ProjectMember,
        project::{CreateProject, Project},
        user::{User, UserRole},
    },
    realtime::ServerMessage,
};
use uuid::Uuid;
use validator::Validate;

/// Create project request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: String,
}

/// Add member request
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
}

fn project_not_found() -> ApiError {
    ApiError::NotFound("Project not found".to_string())
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = Project::list_for_user(&state.db, auth.user_id).await?;
    Ok(Json(projects))
}

/// 404 unless the caller is a member or the owner
pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(project_id): AppPath<Uuid>,
) -> ApiResult<Json<Project>> {
    require_project_access(&state.db, project_id, auth.user_id).await?;

    let project = Project::find_by_id(&state.db, project_id)
        .await?
        .ok_or_else(project_not_found)?;

    Ok(Json(project))
}

/// Create a project
///
/// ```text
/// POST /projects
/// { "name": "Apollo", "description": "Moonshot" }
/// ```
///
/// Responds 201 with the project, whose `memberIds` holds just the owner.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    req.validate()?;

    let project = Project::create(
        &state.db,
        auth.user_id,
        CreateProject {
            name: req.name.trim().to_string(),
            description: req.description,
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, owner_id = %auth.user_id, "Project created");

    state
        .hub
        .publish_with_users(project.id, &[auth.user_id], &ServerMessage::ProjectUpdated(project.clone()))
        .await;

    Ok((StatusCode::CREATED, Json(project)))
}

/// Join a project
///
/// Idempotent. `ProjectUpdated` is only published when the caller was not
/// already a member.
pub async fn join_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(project_id): AppPath<Uuid>,
) -> ApiResult<Json<Project>> {
    if Project::find_by_id(&state.db, project_id).await?.is_none() {
        return Err(project_not_found());
    }

    let _permit = state.hub.sequence(project_id).await;

    let added = ProjectMember::add(&state.db, project_id, auth.user_id).await?;

    let project = Project::find_by_id(&state.db, project_id)
        .await?
        .ok_or_else(project_not_found)?;

    if added {
        tracing::info!(project_id = %project_id, user_id = %auth.user_id, "User joined project");
        state
            .hub
            .publish_with_users(project_id, &[auth.user_id], &ServerMessage::ProjectUpdated(project.clone()))
            .await;
    }

    Ok(Json(project))
}

/// Add a member by username
///
/// ```text
/// POST /projects/:id/members
/// { "username": "bob" }
/// ```
///
/// Requires the global `admin` role; project membership is not required.
///
/// # Errors
///
/// - `403 Forbidden`: caller is not an admin
/// - `404 Not Found`: unknown project or username
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(project_id): AppPath<Uuid>,
    AppJson(req): AppJson<AddMemberRequest>,
) -> ApiResult<Json<Project>> {
    require_role(&state.db, auth.user_id, UserRole::Admin).await?;
    req.validate()?;

    if Project::find_by_id(&state.db, project_id).await?.is_none() {
        return Err(project_not_found());
    }

    let member = User::find_by_username(&state.db, req.username.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let _permit = state.hub.sequence(project_id).await;

    let added = ProjectMember::add(&state.db, project_id, member.id).await?;

    let project = Project::find_by_id(&state.db, project_id)
        .await?
        .ok_or_else(project_not_found)?;

    if added {
        tracing::info!(
            project_id = %project_id,
            member_id = %member.id,
            admin_id = %auth.user_id,
            "Member added to project"
        );
        state
            .hub
            .publish_with_users(project_id, &[member.id], &ServerMessage::ProjectUpdated(project.clone()))
            .await;
    }

    Ok(Json(project))
}
