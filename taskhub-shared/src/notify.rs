/// Notification dispatcher
///
/// Turns qualifying domain events into persisted per-user notifications and
/// pushes them to the recipients' live connections.
///
/// Dispatch has two phases with different guarantees:
///
/// 1. [`persist_comment_notifications`] writes the rows inside the caller's
///    transaction, so they exist before the triggering request responds.
/// 2. [`NotificationDispatcher::deliver`] pushes them after commit. Delivery
///    is best-effort and never fails the request.
///
/// Only a comment on a task that has an assignee qualifies. Recipients are
/// the assignee and the task's creator, minus the comment's author.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    models::{notification::Notification, task::Task},
    realtime::{RealtimeHub, ServerMessage},
};

/// Users to notify about a new comment by `author_id` on `task`.
///
/// Empty when the task has no assignee.
pub fn comment_recipients(task: &Task, author_id: Uuid) -> Vec<Uuid> {
    let Some(assignee) = task.assigned_to_id else {
        return Vec::new();
    };

    let mut recipients = vec![assignee];
    if let Some(creator) = task.created_by {
        if creator != assignee {
            recipients.push(creator);
        }
    }

    recipients.retain(|id| *id != author_id);
    recipients
}

pub fn comment_message(task: &Task) -> String {
    format!("New comment on task {}", task.title)
}

/// Persists notifications for a new comment on the caller's connection,
/// normally an open transaction that also inserts the comment.
pub async fn persist_comment_notifications(
    conn: &mut PgConnection,
    task: &Task,
    author_id: Uuid,
) -> Result<Vec<Notification>, sqlx::Error> {
    let recipients = comment_recipients(task, author_id);
    if recipients.is_empty() {
        return Ok(Vec::new());
    }

    let message = comment_message(task);
    let mut created = Vec::with_capacity(recipients.len());

    for user_id in recipients {
        created.push(Notification::create(&mut *conn, user_id, Some(task.id), &message).await?);
    }

    Ok(created)
}

/// Live delivery half of the dispatcher
#[derive(Clone)]
pub struct NotificationDispatcher {
    hub: RealtimeHub,
}

impl NotificationDispatcher {
    pub fn new(hub: RealtimeHub) -> Self {
        Self { hub }
    }

    /// Pushes each notification to its recipient's open connections.
    ///
    /// Returns the number of frames accepted. Offline recipients simply find
    /// the row on their next `GET /users/notifications`.
    pub async fn deliver(&self, notifications: &[Notification]) -> usize {
        let mut delivered = 0;

        for notification in notifications {
            let sent = self
                .hub
                .send_to_user(notification.user_id, &ServerMessage::Notification(notification.clone()))
                .await;

            tracing::debug!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                connections = sent,
                "Notification pushed"
            );
            delivered += sent;
        }

        delivered
    }
}
