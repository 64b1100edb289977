/// Realtime broadcast layer
///
/// Live clients hold one connection each, registered in a [`RealtimeHub`].
/// Connections subscribe to project topics (`project-{id}`) and receive the
/// [`ServerMessage`] events published for that project, plus events sent
/// directly to their user (notifications, project membership changes).
///
/// The transport (WebSocket sessions) lives in the API crate. This module only
/// knows about identities, topics and per-connection outbound queues.

pub mod hub;
pub mod protocol;

pub use hub::{ConnectionId, HubError, Outbound, RealtimeHub};
pub use protocol::{ClientMessage, ServerMessage};

use uuid::Uuid;

/// Topic name for a project
pub fn topic_for(project_id: Uuid) -> String {
    format!("project-{}", project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_for() {
        let id = Uuid::nil();
        assert_eq!(topic_for(id), "project-00000000-0000-0000-0000-000000000000");
    }
}
