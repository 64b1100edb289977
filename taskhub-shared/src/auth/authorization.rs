/// Authorization guard
///
/// Decides, per operation, whether an authenticated user may touch a project
/// or task. Each check has two halves: a pure decision function over an
/// access snapshot (unit tested below) and an async `require_*` wrapper that
/// loads the snapshot from the store.
///
/// # Rules
///
/// | Operation | Allowed when |
/// |---|---|
/// | project read/write, topic join | project member or owner |
/// | task view, update, delete | task assignee or project member |
/// | comment / attachment on task | project member (assignee alone is not enough) |
/// | add member to any project | global `admin` role |
///
/// Resources the caller cannot see are reported as [`AuthzError::NotFound`],
/// never as forbidden, so their existence doesn't leak. `Forbidden` is only
/// used when the caller can already see the resource.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{
    project::{Project, ProjectAccess},
    task::{Task, TaskAccess},
    user::{User, UserRole},
};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Resource doesn't exist or the caller may not know it exists
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Resource is visible but the action is not allowed
    #[error("Not allowed: {0}")]
    Forbidden(&'static str),

    #[error("Insufficient permissions: requires {} role", required.as_str())]
    InsufficientRole { required: UserRole },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// What the caller wants to do with a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPermission {
    View,
    Modify,
    /// Add comments or attachments
    Contribute,
}

/// Project membership decision.
pub fn check_project_access(access: Option<ProjectAccess>, user_id: Uuid) -> Result<(), AuthzError> {
    match access {
        Some(access) if access.is_member || access.owner_id == user_id => Ok(()),
        _ => Err(AuthzError::NotFound("Project")),
    }
}

/// Task permission decision.
pub fn check_task_permission(
    access: Option<TaskAccess>,
    user_id: Uuid,
    permission: TaskPermission,
) -> Result<TaskAccess, AuthzError> {
    let access = access.ok_or(AuthzError::NotFound("Task"))?;
    let is_assignee = access.assigned_to_id == Some(user_id);

    match permission {
        TaskPermission::View | TaskPermission::Modify if access.is_member || is_assignee => Ok(access),
        TaskPermission::Contribute if access.is_member => Ok(access),
        TaskPermission::Contribute if is_assignee => Err(AuthzError::Forbidden(
            "only project members can comment on or attach files to tasks",
        )),
        _ => Err(AuthzError::NotFound("Task")),
    }
}

/// Global role decision.
pub fn check_role(actual: UserRole, required: UserRole) -> Result<(), AuthzError> {
    match (required, actual) {
        (UserRole::User, _) | (UserRole::Admin, UserRole::Admin) => Ok(()),
        (UserRole::Admin, UserRole::User) => Err(AuthzError::InsufficientRole { required }),
    }
}

/// Requires `user_id` to be a member or the owner of the project.
///
/// # Errors
///
/// `AuthzError::NotFound` if the project doesn't exist or the user has no access.
pub async fn require_project_access<'e, E: PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<(), AuthzError> {
    let access = Project::access_for(executor, project_id, user_id).await?;
    check_project_access(access, user_id)
}

/// Requires `permission` on the task and returns the loaded access snapshot,
/// whose `project_id` callers use to address the realtime topic.
pub async fn require_task_permission<'e, E: PgExecutor<'e>>(
    executor: E,
    task_id: Uuid,
    user_id: Uuid,
    permission: TaskPermission,
) -> Result<TaskAccess, AuthzError> {
    let access = Task::access_for(executor, task_id, user_id).await?;
    check_task_permission(access, user_id, permission)
}

/// Requires the user's global role to be at least `required`.
///
/// The role is read from the store on every call so a promotion takes effect
/// without re-issuing tokens.
pub async fn require_role<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    required: UserRole,
) -> Result<(), AuthzError> {
    let user = User::find_by_id(executor, user_id)
        .await?
        .ok_or(AuthzError::NotFound("User"))?;

    check_role(user.role, required)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_access(is_member: bool, assignee: Option<Uuid>) -> Option<TaskAccess> {
        Some(TaskAccess {
            project_id: Uuid::new_v4(),
            assigned_to_id: assignee,
            is_member,
        })
    }

    #[test]
    fn test_project_access_member_or_owner() {
        let user = Uuid::new_v4();

        let member = ProjectAccess { owner_id: Uuid::new_v4(), is_member: true };
        assert!(check_project_access(Some(member), user).is_ok());

        let owner = ProjectAccess { owner_id: user, is_member: false };
        assert!(check_project_access(Some(owner), user).is_ok());
    }

    #[test]
    fn test_project_access_outsider_sees_not_found() {
        let outsider = ProjectAccess { owner_id: Uuid::new_v4(), is_member: false };

        assert!(matches!(
            check_project_access(Some(outsider), Uuid::new_v4()),
            Err(AuthzError::NotFound("Project"))
        ));
        assert!(matches!(
            check_project_access(None, Uuid::new_v4()),
            Err(AuthzError::NotFound("Project"))
        ));
    }

    #[test]
    fn test_member_has_every_task_permission() {
        let user = Uuid::new_v4();

        for permission in [TaskPermission::View, TaskPermission::Modify, TaskPermission::Contribute] {
            assert!(check_task_permission(task_access(true, None), user, permission).is_ok());
        }
    }

    #[test]
    fn test_assignee_can_view_and_modify() {
        let user = Uuid::new_v4();

        assert!(check_task_permission(task_access(false, Some(user)), user, TaskPermission::View).is_ok());
        assert!(check_task_permission(task_access(false, Some(user)), user, TaskPermission::Modify).is_ok());
    }

    #[test]
    fn test_assignee_alone_cannot_contribute() {
        let user = Uuid::new_v4();

        assert!(matches!(
            check_task_permission(task_access(false, Some(user)), user, TaskPermission::Contribute),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn test_outsider_sees_task_as_missing() {
        let user = Uuid::new_v4();
        let someone_else = Some(Uuid::new_v4());

        for permission in [TaskPermission::View, TaskPermission::Modify, TaskPermission::Contribute] {
            assert!(matches!(
                check_task_permission(task_access(false, someone_else), user, permission),
                Err(AuthzError::NotFound("Task"))
            ));
            assert!(matches!(
                check_task_permission(None, user, permission),
                Err(AuthzError::NotFound("Task"))
            ));
        }
    }

    #[test]
    fn test_check_role() {
        assert!(check_role(UserRole::Admin, UserRole::Admin).is_ok());
        assert!(check_role(UserRole::Admin, UserRole::User).is_ok());
        assert!(check_role(UserRole::User, UserRole::User).is_ok());
        assert!(matches!(
            check_role(UserRole::User, UserRole::Admin),
            Err(AuthzError::InsufficientRole { required: UserRole::Admin })
        ));
    }

    #[test]
    fn test_authz_error_display() {
        assert_eq!(AuthzError::NotFound("Task").to_string(), "Task not found");
        assert!(AuthzError::InsufficientRole { required: UserRole::Admin }
            .to_string()
            .contains("admin"));
    }
}
