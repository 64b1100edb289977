/// Realtime wire protocol
///
/// Frames are JSON text messages. Server frames are adjacently tagged:
///
/// ```json
/// {"event": "TaskUpdated", "data": {"taskId": "…", "status": "Done", "task": {…}}}
/// ```
///
/// Client frames carry an `action` tag:
///
/// ```json
/// {"action": "JoinProjectGroup", "projectId": "…"}
/// ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{comment::Comment, notification::Notification, project::Project, task::{Task, TaskStatus}};

/// Frames pushed from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection; `authenticated` is false until the
    /// client sends `Authenticate`
    Connected { authenticated: bool },

    Authenticated { user_id: Uuid },

    JoinedProjectGroup { project_id: Uuid },

    LeftProjectGroup { project_id: Uuid },

    /// A client action was rejected; the connection stays open
    Error { message: String },

    TaskCreated(Task),

    TaskUpdated {
        task_id: Uuid,
        status: TaskStatus,
        task: Task,
    },

    TaskDeleted { task_id: Uuid },

    CommentAdded { task_id: Uuid, comment: Comment },

    ProjectUpdated(Project),

    Notification(Notification),
}

impl ServerMessage {
    pub fn task_updated(task: Task) -> Self {
        ServerMessage::TaskUpdated {
            task_id: task.id,
            status: task.status,
            task,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }

    /// Event name as it appears in the `event` field
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "Connected",
            ServerMessage::Authenticated { .. } => "Authenticated",
            ServerMessage::JoinedProjectGroup { .. } => "JoinedProjectGroup",
            ServerMessage::LeftProjectGroup { .. } => "LeftProjectGroup",
            ServerMessage::Error { .. } => "Error",
            ServerMessage::TaskCreated(_) => "TaskCreated",
            ServerMessage::TaskUpdated { .. } => "TaskUpdated",
            ServerMessage::TaskDeleted { .. } => "TaskDeleted",
            ServerMessage::CommentAdded { .. } => "CommentAdded",
            ServerMessage::ProjectUpdated(_) => "ProjectUpdated",
            ServerMessage::Notification(_) => "Notification",
        }
    }
}

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// For clients that cannot attach a credential to the upgrade request
    Authenticate { token: String },

    JoinProjectGroup { project_id: Uuid },

    LeaveProjectGroup { project_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Ship it".to_string(),
            description: String::new(),
            status: TaskStatus::Done,
            priority: Default::default(),
            due_date: None,
            assigned_to_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_updated_frame_shape() {
        let task = sample_task();
        let frame = serde_json::to_value(ServerMessage::task_updated(task.clone())).unwrap();

        assert_eq!(frame["event"], "TaskUpdated");
        assert_eq!(frame["data"]["taskId"], task.id.to_string());
        assert_eq!(frame["data"]["status"], "Done");
        assert_eq!(frame["data"]["task"]["title"], "Ship it");
    }

    #[test]
    fn test_task_deleted_frame_shape() {
        let id = Uuid::new_v4();
        let frame = serde_json::to_value(ServerMessage::TaskDeleted { task_id: id }).unwrap();

        assert_eq!(frame, json!({"event": "TaskDeleted", "data": {"taskId": id.to_string()}}));
    }

    #[test]
    fn test_newtype_events_carry_record_as_data() {
        let task = sample_task();
        let frame = serde_json::to_value(ServerMessage::TaskCreated(task.clone())).unwrap();

        assert_eq!(frame["event"], "TaskCreated");
        assert_eq!(frame["data"]["id"], task.id.to_string());
        assert_eq!(ServerMessage::TaskCreated(task).name(), "TaskCreated");
    }

    #[test]
    fn test_parse_client_actions() {
        let project_id = Uuid::new_v4();

        let join: ClientMessage = serde_json::from_value(json!({
            "action": "JoinProjectGroup",
            "projectId": project_id,
        }))
        .unwrap();
        assert_eq!(join, ClientMessage::JoinProjectGroup { project_id });

        let leave: ClientMessage = serde_json::from_value(json!({
            "action": "LeaveProjectGroup",
            "projectId": project_id,
        }))
        .unwrap();
        assert_eq!(leave, ClientMessage::LeaveProjectGroup { project_id });

        let auth: ClientMessage =
            serde_json::from_value(json!({"action": "Authenticate", "token": "abc"})).unwrap();
        assert_eq!(auth, ClientMessage::Authenticate { token: "abc".to_string() });
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({"action": "DropTables"}));
        assert!(result.is_err());
    }
}
