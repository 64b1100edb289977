/// Database models for TaskHub
///
/// Each model owns its SQL. Query functions are generic over
/// [`sqlx::PgExecutor`] so they run equally against the pool or inside a
/// caller's transaction.
///
/// - `user`: accounts and the global role
/// - `project`: projects with their member ids
/// - `membership`: the project ↔ user association
/// - `task`: tasks, their enums and list filters
/// - `comment`, `attachment`: task children
/// - `notification`: per-user notifications

pub mod attachment;
pub mod comment;
pub mod membership;
pub mod notification;
pub mod project;
pub mod task;
pub mod user;
