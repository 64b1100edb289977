/// Application state and router builder
///
/// `AppState` carries the lifecycle-scoped services every handler needs: the
/// database pool, configuration, realtime hub, notification dispatcher and
/// attachment storage. It is cloned per request; every field is a cheap
/// handle.
///
/// # Example
///
/// ```no_run
/// use taskhub_api::{app::{build_router, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::security::SecurityHeadersLayer,
    storage::{AttachmentStorage, LocalDiskStorage},
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use taskhub_shared::{
    auth::middleware::{jwt_auth_middleware, AuthError},
    notify::NotificationDispatcher,
    realtime::RealtimeHub,
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Live connection registry
    pub hub: RealtimeHub,

    pub dispatcher: NotificationDispatcher,

    pub storage: Arc<dyn AttachmentStorage>,
}

impl AppState {
    /// Creates state with a fresh hub and local-disk attachment storage
    pub fn new(db: PgPool, config: Config) -> Self {
        let storage = Arc::new(LocalDiskStorage::new(config.uploads.dir.clone()));
        Self::with_storage(db, config, storage)
    }

    pub fn with_storage(db: PgPool, config: Config, storage: Arc<dyn AttachmentStorage>) -> Self {
        let hub = RealtimeHub::new(config.hub.channel_capacity);

        Self {
            db,
            config: Arc::new(config),
            dispatcher: NotificationDispatcher::new(hub.clone()),
            hub,
            storage,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                          (public)
/// ├── /auth/                                (public)
/// │   ├── POST /register
/// │   ├── POST /login
/// │   └── POST /refresh
/// ├── /projects/                            (authenticated)
/// │   ├── GET|POST /
/// │   ├── GET      /:id
/// │   ├── POST     /:id/join
/// │   └── POST     /:id/members             (admin)
/// ├── /tasks/                               (authenticated)
/// │   ├── GET|POST        /
/// │   ├── GET|PUT|DELETE  /:id
/// │   ├── GET|POST        /:id/comments
/// │   └── POST            /:id/attachments  (multipart)
/// ├── /users/                               (authenticated)
/// │   ├── GET|PUT /profile
/// │   ├── GET     /search
/// │   ├── GET     /notifications
/// │   └── PUT     /notifications/:id/read
/// └── GET  /hub                             (websocket, authenticates itself)
/// ```
///
/// # Middleware Stack
///
/// Applied outermost first: security headers, CORS, tracing, then per-group
/// authentication. JSON routes are compressed; the websocket route is not.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let project_routes = Router::new()
        .route("/", get(routes::projects::list_projects).post(routes::projects::create_project))
        .route("/:id", get(routes::projects::get_project))
        .route("/:id/join", post(routes::projects::join_project))
        .route("/:id/members", post(routes::projects::add_member));

    let task_routes = Router::new()
        .route("/", get(routes::tasks::list_tasks).post(routes::tasks::create_task))
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route(
            "/:id/comments",
            get(routes::tasks::list_comments).post(routes::tasks::add_comment),
        )
        .route(
            "/:id/attachments",
            post(routes::tasks::upload_attachment)
                .layer(DefaultBodyLimit::max(state.config.uploads.max_bytes)),
        );

    let user_routes = Router::new()
        .route(
            "/profile",
            get(routes::users::get_profile).put(routes::users::update_profile),
        )
        .route("/search", get(routes::users::search_users))
        .route("/notifications", get(routes::users::list_notifications))
        .route("/notifications/:id/read", put(routes::users::mark_notification_read));

    let protected_routes = Router::new()
        .nest("/projects", project_routes)
        .nest("/tasks", task_routes)
        .nest("/users", user_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), jwt_auth_layer));

    let json_routes = Router::new()
        .merge(health_routes)
        .nest("/auth", auth_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new());

    // The upgrade handler authenticates from header or query itself
    let realtime_routes = Router::new().route("/hub", get(routes::realtime::hub_upgrade));

    let cors = if state.config.cors_permissive() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(json_routes)
        .merge(realtime_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Rejects requests without a valid access token before any handler or
/// store access runs, and injects the caller's `AuthContext`.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next).await
}
