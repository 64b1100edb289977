/// Project model and database operations
///
/// A project groups tasks and owns a membership set. The owner is inserted as
/// a member in the same transaction that creates the project, so the owner is
/// always a member.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     owner_id UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::membership::ProjectMember;

/// A project together with its current member ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub description: String,
}

/// The caller's relationship to a project, loaded for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ProjectAccess {
    pub owner_id: Uuid,
    pub is_member: bool,
}

const PROJECT_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.owner_id, p.created_at,
           ARRAY(
               SELECT pm.user_id FROM project_members pm
               WHERE pm.project_id = p.id
               ORDER BY pm.joined_at, pm.user_id
           ) AS member_ids
    FROM projects p
"#;

impl Project {
    /// Creates a project owned by `owner_id` and makes the owner its first member.
    ///
    /// Both rows are written in one transaction.
    pub async fn create(pool: &PgPool, owner_id: Uuid, data: CreateProject) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO projects (name, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        ProjectMember::add(&mut *tx, id, owner_id).await?;

        tx.commit().await?;

        Ok(Self {
            id,
            name: data.name,
            description: data.description,
            owner_id,
            created_at,
            member_ids: vec![owner_id],
        })
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!("{} WHERE p.id = $1", PROJECT_SELECT))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Projects the user owns or is a member of, newest first
    pub async fn list_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"{}
            WHERE p.owner_id = $1
               OR EXISTS (
                   SELECT 1 FROM project_members pm
                   WHERE pm.project_id = p.id AND pm.user_id = $1
               )
            ORDER BY p.created_at DESC
            "#,
            PROJECT_SELECT
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Loads how `user_id` relates to the project, or `None` if it doesn't exist.
    pub async fn access_for<'e, E: PgExecutor<'e>>(
        executor: E,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectAccess>, sqlx::Error> {
        sqlx::query_as::<_, ProjectAccess>(
            r#"
            SELECT p.owner_id,
                   EXISTS (
                       SELECT 1 FROM project_members pm
                       WHERE pm.project_id = p.id AND pm.user_id = $2
                   ) AS is_member
            FROM projects p
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}
