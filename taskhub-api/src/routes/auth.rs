/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /auth/register` - Register new user
/// - `POST /auth/login` - Login and get tokens
/// - `POST /auth/refresh` - Exchange a refresh token for a new access token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
    extract::AppJson,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use taskhub_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, User},
};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked against the strength policy after field validation
    pub password: String,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token (24h)
    pub token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub token: String,
}

/// Usernames are ASCII letters, digits, `.`, `-` and `_`.
pub(crate) fn username_charset_ok(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /auth/register
/// Content-Type: application/json
///
/// {
///   "username": "alice",
///   "email": "alice@example.com",
///   "password": "SecureP4ss"
/// }
/// ```
///
/// # Response
///
/// ```json
/// { "message": "User registered successfully" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed or username already taken
/// - `500 Internal Server Error`: Server error
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let mut errors = match req.validate() {
        Ok(()) => Vec::new(),
        Err(e) => match ApiError::from(e) {
            ApiError::ValidationError(details) => details,
            other => return Err(other),
        },
    };

    if !username_charset_ok(&req.username) {
        errors.push(ValidationErrorDetail::new(
            "username",
            "Username may only contain letters, digits, '.', '-' and '_'",
        ));
    }
    if let Err(message) = password::validate_password_strength(&req.password) {
        errors.push(ValidationErrorDetail::new("password", message));
    }
    if !errors.is_empty() {
        return Err(ApiError::ValidationError(errors));
    }

    let password_hash = password::hash_password(&req.password)?;

    // A concurrent duplicate still fails on users_username_key and maps to the same 400
    let user = User::create(
        &state.db,
        CreateUser {
            username: req.username,
            email: req.email,
            password_hash,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok(Json(RegisterResponse {
        message: "User registered successfully".to_string(),
    }))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /auth/login
/// Content-Type: application/json
///
/// { "username": "alice", "password": "SecureP4ss" }
/// ```
///
/// # Response
///
/// ```json
/// { "token": "eyJ...", "refreshToken": "eyJ..." }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = User::find_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(username = %req.username, "Login rejected: wrong password");
        return Err(invalid());
    }

    let access_claims = jwt::Claims::new(user.id, user.username.clone(), jwt::TokenType::Access);
    let refresh_claims = jwt::Claims::new(user.id, user.username, jwt::TokenType::Refresh);

    Ok(Json(LoginResponse {
        token: jwt::create_token(&access_claims, state.jwt_secret())?,
        refresh_token: jwt::create_token(&refresh_claims, state.jwt_secret())?,
    }))
}

/// Token refresh endpoint
///
/// ```text
/// POST /auth/refresh
/// { "refreshToken": "eyJ..." }
/// ```
///
/// Responds with `{ "token": "eyJ..." }`, or 401 if the refresh token is
/// invalid, expired or actually an access token.
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(req): AppJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { token }))
}
