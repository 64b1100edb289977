/// Fan-out tests for the realtime hub and notification dispatcher
///
/// No database needed; connections are driven through their outbound queues.

use chrono::Utc;
use serde_json::Value;
use taskhub_shared::{
    models::{notification::Notification, project::Project},
    notify::NotificationDispatcher,
    realtime::{Outbound, RealtimeHub, ServerMessage},
};
use tokio::sync::mpsc;
use uuid::Uuid;

fn parse(frame: Outbound) -> Value {
    serde_json::from_str(&frame).unwrap()
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(parse(frame));
    }
    frames
}

fn notification(user_id: Uuid) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        task_id: Some(Uuid::new_v4()),
        message: "New comment on task T".to_string(),
        is_read: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_only_subscribers_receive_project_events() {
    let hub = RealtimeHub::new(16);
    let project = Uuid::new_v4();
    let other_project = Uuid::new_v4();

    let (subscribed, mut rx_subscribed) = hub.register(Uuid::new_v4()).await.unwrap();
    let (elsewhere, mut rx_elsewhere) = hub.register(Uuid::new_v4()).await.unwrap();
    let (_idle, mut rx_idle) = hub.register(Uuid::new_v4()).await.unwrap();

    hub.join(subscribed, project).await.unwrap();
    hub.join(elsewhere, other_project).await.unwrap();

    let task_id = Uuid::new_v4();
    assert_eq!(hub.publish(project, &ServerMessage::TaskDeleted { task_id }).await, 1);

    let frames = drain(&mut rx_subscribed);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["event"], "TaskDeleted");
    assert_eq!(frames[0]["data"]["taskId"], task_id.to_string());

    assert!(drain(&mut rx_elsewhere).is_empty());
    assert!(drain(&mut rx_idle).is_empty());
}

#[tokio::test]
async fn test_leave_stops_delivery() {
    let hub = RealtimeHub::new(16);
    let project = Uuid::new_v4();
    let (conn, mut rx) = hub.register(Uuid::new_v4()).await.unwrap();

    hub.join(conn, project).await.unwrap();
    hub.leave(conn, project).await.unwrap();

    assert_eq!(hub.publish(project, &ServerMessage::TaskDeleted { task_id: Uuid::new_v4() }).await, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_sequenced_writers_publish_in_commit_order() {
    let hub = RealtimeHub::new(256);
    let project = Uuid::new_v4();
    let (conn, mut rx) = hub.register(Uuid::new_v4()).await.unwrap();
    hub.join(conn, project).await.unwrap();

    // Each writer "commits" by taking the next sequence number under the
    // permit, then publishes it before releasing.
    let commits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut writers = Vec::new();

    for _ in 0..32 {
        let hub = hub.clone();
        let commits = commits.clone();
        writers.push(tokio::spawn(async move {
            let _permit = hub.sequence(project).await;
            let n = commits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::task::yield_now().await;
            hub.publish(project, &ServerMessage::error(n.to_string())).await;
        }));
    }

    for writer in writers {
        writer.await.unwrap();
    }

    let order: Vec<usize> = drain(&mut rx)
        .iter()
        .map(|frame| frame["data"]["message"].as_str().unwrap().parse().unwrap())
        .collect();

    assert_eq!(order, (0..32).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_closed_connection_does_not_affect_others() {
    let hub = RealtimeHub::new(16);
    let project = Uuid::new_v4();

    let (gone, rx_gone) = hub.register(Uuid::new_v4()).await.unwrap();
    let (alive, mut rx_alive) = hub.register(Uuid::new_v4()).await.unwrap();
    hub.join(gone, project).await.unwrap();
    hub.join(alive, project).await.unwrap();

    // Session task died before unregistering
    drop(rx_gone);

    assert_eq!(hub.publish(project, &ServerMessage::TaskDeleted { task_id: Uuid::new_v4() }).await, 1);
    assert_eq!(drain(&mut rx_alive).len(), 1);
}

#[tokio::test]
async fn test_dispatcher_pushes_to_recipient_connections_only() {
    let hub = RealtimeHub::new(16);
    let dispatcher = NotificationDispatcher::new(hub.clone());

    let recipient = Uuid::new_v4();
    let (_laptop, mut rx_laptop) = hub.register(recipient).await.unwrap();
    let (_phone, mut rx_phone) = hub.register(recipient).await.unwrap();
    let (_other, mut rx_other) = hub.register(Uuid::new_v4()).await.unwrap();

    let offline = Uuid::new_v4();
    let delivered = dispatcher
        .deliver(&[notification(recipient), notification(offline)])
        .await;
    assert_eq!(delivered, 2);

    for rx in [&mut rx_laptop, &mut rx_phone] {
        let frames = drain(rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "Notification");
        assert_eq!(frames[0]["data"]["userId"], recipient.to_string());
        assert_eq!(frames[0]["data"]["isRead"], false);
    }

    assert!(drain(&mut rx_other).is_empty());
}

#[tokio::test]
async fn test_project_update_reaches_added_user_before_subscribing() {
    let hub = RealtimeHub::new(16);
    let project = Uuid::new_v4();
    let added = Uuid::new_v4();

    let (member, mut rx_member) = hub.register(Uuid::new_v4()).await.unwrap();
    let (_added_conn, mut rx_added) = hub.register(added).await.unwrap();
    hub.join(member, project).await.unwrap();

    let frame = ServerMessage::ProjectUpdated(Project {
        id: project,
        name: "Launch".to_string(),
        description: String::new(),
        owner_id: Uuid::new_v4(),
        created_at: Utc::now(),
        member_ids: vec![added],
    });
    assert_eq!(hub.publish_with_users(project, &[added], &frame).await, 2);

    assert_eq!(drain(&mut rx_member).len(), 1);
    let frames = drain(&mut rx_added);
    assert_eq!(frames[0]["event"], "ProjectUpdated");
    assert_eq!(frames[0]["data"]["memberIds"][0], added.to_string());
}
