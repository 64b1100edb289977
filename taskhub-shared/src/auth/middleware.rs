/// Request authentication for Axum
///
/// Extracts the bearer credential from a request, validates it, and exposes the
/// caller's identity as an [`AuthContext`] in request extensions. Every
/// authenticated route and the realtime upgrade go through [`authenticate`], so
/// an unauthenticated request is rejected before any store access happens.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use taskhub_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, {}!", auth.username)
/// }
///
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn(|req, next| {
///         jwt_auth_middleware("a-secret-of-at-least-32-characters".to_string(), req, next)
///     }));
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{validate_access_token, Claims, JwtError};

/// Authenticated identity attached to a request or realtime connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
}

impl AuthContext {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

/// Error type for authentication
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No credential on the request
    MissingCredentials,

    /// Authorization header present but not `Bearer <token>`
    InvalidFormat(String),

    /// Token failed validation or has expired
    InvalidToken(String),
}

impl AuthError {
    pub fn message(&self) -> &str {
        match self {
            AuthError::MissingCredentials => "Missing credentials",
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => msg,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Every authentication failure is a 401 so clients can uniformly re-login.
        let body = Json(json!({
            "error": "unauthorized",
            "message": self.message(),
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates a raw access token and builds the caller's context.
pub fn authenticate_token(token: &str, secret: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_access_token(token, secret)?;
    Ok(AuthContext::from_claims(claims))
}

/// Authenticates a request from its headers.
///
/// # Errors
///
/// - `AuthError::MissingCredentials` when no Authorization header is present
/// - `AuthError::InvalidFormat` when it is not a Bearer credential
/// - `AuthError::InvalidToken` when the token is invalid, expired or a refresh token
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;
    authenticate_token(token, secret)
}

/// JWT authentication middleware
///
/// Inserts an [`AuthContext`] extension on success and short-circuits with a
/// 401 otherwise.
pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = authenticate(req.headers(), &secret)?;

    tracing::trace!(user_id = %auth_context.user_id, "Request authenticated");
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            authenticate(&HeaderMap::new(), SECRET),
            Err(AuthError::MissingCredentials)
        );
    }

    #[test]
    fn test_non_bearer_header() {
        let result = authenticate(&headers_with("Basic dXNlcjpwYXNz"), SECRET);
        assert!(matches!(result, Err(AuthError::InvalidFormat(_))));

        let result = authenticate(&headers_with("Bearer "), SECRET);
        assert!(matches!(result, Err(AuthError::InvalidFormat(_))));
    }

    #[test]
    fn test_valid_access_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(&Claims::new(user_id, "carol", TokenType::Access), SECRET).unwrap();

        let context = authenticate(&headers_with(&format!("Bearer {}", token)), SECRET).unwrap();
        assert_eq!(context.user_id, user_id);
        assert_eq!(context.username, "carol");
    }

    #[test]
    fn test_refresh_token_is_not_a_credential() {
        let token = create_token(&Claims::new(Uuid::new_v4(), "carol", TokenType::Refresh), SECRET).unwrap();

        let result = authenticate_token(&token, SECRET);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_auth_error_is_always_unauthorized() {
        for err in [
            AuthError::MissingCredentials,
            AuthError::InvalidFormat("x".to_string()),
            AuthError::InvalidToken("y".to_string()),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
