/// API route handlers, organized by resource
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, token refresh
/// - `projects`: Projects and membership
/// - `tasks`: Tasks, comments, attachments
/// - `users`: Profile, user search, notifications
/// - `realtime`: Websocket upgrade and session loop

pub mod auth;
pub mod health;
pub mod projects;
pub mod realtime;
pub mod tasks;
pub mod users;
