/// User profile, search and notification endpoints
///
/// # Endpoints
///
/// - `GET /users/profile` - Caller's profile
/// - `PUT /users/profile` - Update username and/or email
/// - `GET /users/search?query=` - Find users by username or email substring
/// - `GET /users/notifications` - Caller's unread notifications, newest first
/// - `PUT /users/notifications/:id/read` - Mark one read (idempotent)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    routes::auth::username_charset_ok,
};
use axum::{
    extract::State,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use taskhub_shared::{
    auth::middleware::AuthContext,
    models::{
        notification::Notification,
        user::{UpdateUser, User, UserRole, UserSummary},
    },
};
use uuid::Uuid;
use validator::Validate;

const SEARCH_LIMIT: i64 = 20;

/// Public view of the caller's account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

/// Update profile request; omitted fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ProfileResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(user.into()))
}

/// Update the caller's profile
///
/// A taken username is a 400 on `username`. Tokens issued before a rename
/// keep the old username in their claims until they expire; identity checks
/// use the user id only.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    req.validate()?;

    if let Some(username) = &req.username {
        if !username_charset_ok(username) {
            return Err(ApiError::invalid(
                "username",
                "Username may only contain letters, digits, '.', '-' and '_'",
            ));
        }
    }

    let user = User::update_profile(
        &state.db,
        auth.user_id,
        UpdateUser {
            username: req.username,
            email: req.email,
        },
    )
    .await?
    .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(user.into()))
}

/// Search users
///
/// Case-insensitive substring match on username or email, at most 20
/// results. A blank query returns an empty list rather than every user.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    AppQuery(params): AppQuery<SearchQuery>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let users = User::search(&state.db, query, SEARCH_LIMIT).await?;
    Ok(Json(users))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = Notification::list_unread(&state.db, auth.user_id).await?;
    Ok(Json(notifications))
}

/// Mark a notification read
///
/// Succeeds every time for the owner. Another user's notification is a 404.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(notification_id): AppPath<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_read(&state.db, notification_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(Json(notification))
}
