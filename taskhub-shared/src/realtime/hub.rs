/// Connection registry and event fan-out
///
/// The hub owns three indexes behind a single async `RwLock`:
///
/// - connection → (user, outbound queue, joined topics)
/// - topic → connections
/// - user → connections
///
/// Registration, join, leave and unregister take the write lock; publishing
/// takes the read lock, so a publish never observes a half-registered
/// connection. Each connection has a bounded queue drained by its session
/// task. Delivery uses `try_send`: a full or closed queue drops that one
/// message for that one connection and never blocks the publisher.
///
/// # Ordering
///
/// Writers that mutate a project hold [`RealtimeHub::sequence`] for that
/// project across their commit and publish. Events on one topic therefore
/// reach every subscriber queue in commit order.
///
/// # Example
///
/// ```
/// use taskhub_shared::realtime::{RealtimeHub, ServerMessage};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hub = RealtimeHub::new(64);
/// let project_id = Uuid::new_v4();
///
/// let (conn, mut rx) = hub.register(Uuid::new_v4()).await?;
/// hub.join(conn, project_id).await?;
///
/// let delivered = hub.publish(project_id, &ServerMessage::TaskDeleted { task_id: Uuid::new_v4() }).await;
/// assert_eq!(delivered, 1);
/// assert!(rx.recv().await.is_some());
/// # Ok(())
/// # }
/// ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{protocol::ServerMessage, topic_for};

/// Serialized frame queued for a connection
pub type Outbound = Arc<str>;

/// Process-unique id of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("realtime hub is shutting down")]
    ShuttingDown,

    #[error("{0} is not registered")]
    UnknownConnection(ConnectionId),
}

struct Connection {
    user_id: Uuid,
    sender: mpsc::Sender<Outbound>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    topics: HashMap<String, HashSet<ConnectionId>>,
    users: HashMap<Uuid, HashSet<ConnectionId>>,
}

impl Registry {
    fn detach_from_topic(&mut self, topic: &str, id: ConnectionId) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.remove(&id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

struct HubInner {
    registry: RwLock<Registry>,
    sequencers: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    next_id: AtomicU64,
    channel_capacity: usize,
    shutdown: CancellationToken,
}

/// Lifecycle-scoped connection registry. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl RealtimeHub {
    /// Creates a hub whose per-connection queues hold `channel_capacity` frames.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: RwLock::new(Registry::default()),
                sequencers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                channel_capacity: channel_capacity.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Registers an authenticated connection and returns its outbound queue.
    ///
    /// # Errors
    ///
    /// `HubError::ShuttingDown` once [`shutdown`](Self::shutdown) has been called.
    pub async fn register(&self, user_id: Uuid) -> Result<(ConnectionId, mpsc::Receiver<Outbound>), HubError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }

        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);

        let mut registry = self.inner.registry.write().await;
        registry.connections.insert(
            id,
            Connection {
                user_id,
                sender,
                topics: HashSet::new(),
            },
        );
        registry.users.entry(user_id).or_default().insert(id);

        debug!(connection = %id, user_id = %user_id, "Realtime connection registered");
        Ok((id, receiver))
    }

    /// Removes a connection from every index. Unknown ids are ignored.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut registry = self.inner.registry.write().await;

        let Some(connection) = registry.connections.remove(&id) else {
            return;
        };

        for topic in &connection.topics {
            registry.detach_from_topic(topic, id);
        }

        if let Some(conns) = registry.users.get_mut(&connection.user_id) {
            conns.remove(&id);
            if conns.is_empty() {
                registry.users.remove(&connection.user_id);
            }
        }

        debug!(connection = %id, user_id = %connection.user_id, "Realtime connection unregistered");
    }

    /// Subscribes a connection to a project topic.
    ///
    /// Authorization is the caller's job. Returns `true` if the connection was
    /// not already subscribed.
    pub async fn join(&self, id: ConnectionId, project_id: Uuid) -> Result<bool, HubError> {
        let topic = topic_for(project_id);
        let mut registry = self.inner.registry.write().await;

        let connection = registry
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;

        let newly_joined = connection.topics.insert(topic.clone());
        registry.topics.entry(topic).or_default().insert(id);

        Ok(newly_joined)
    }

    /// Unsubscribes a connection from a project topic. Returns `true` if it was subscribed.
    pub async fn leave(&self, id: ConnectionId, project_id: Uuid) -> Result<bool, HubError> {
        let topic = topic_for(project_id);
        let mut registry = self.inner.registry.write().await;

        let connection = registry
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;

        let was_joined = connection.topics.remove(&topic);
        registry.detach_from_topic(&topic, id);

        Ok(was_joined)
    }

    /// Acquires the publish permit for a project.
    ///
    /// Hold the guard from before the store commit until after the publish.
    /// Permits nobody holds or waits on are pruned here, so the table only
    /// tracks projects with writers in flight.
    pub async fn sequence(&self, project_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut sequencers = self.inner.sequencers.lock().await;
            // Guards and waiters each hold a clone; the map's own Arc is the last one
            sequencers.retain(|_, lock| Arc::strong_count(lock) > 1);
            sequencers
                .entry(project_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Sends `message` to every connection subscribed to the project's topic.
    ///
    /// Returns how many connections accepted the frame.
    pub async fn publish(&self, project_id: Uuid, message: &ServerMessage) -> usize {
        self.publish_with_users(project_id, &[], message).await
    }

    /// Sends `message` to the project's subscribers and to every connection of
    /// `users`, delivering at most once per connection.
    pub async fn publish_with_users(&self, project_id: Uuid, users: &[Uuid], message: &ServerMessage) -> usize {
        let Some(payload) = encode(message) else {
            return 0;
        };

        let topic = topic_for(project_id);
        let registry = self.inner.registry.read().await;

        let mut targets: HashSet<ConnectionId> = registry
            .topics
            .get(&topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();

        for user_id in users {
            if let Some(conns) = registry.users.get(user_id) {
                targets.extend(conns.iter().copied());
            }
        }

        let delivered = deliver_all(&registry, targets.iter(), &payload, message.name());

        debug!(topic = %topic, event = message.name(), delivered, "Published realtime event");
        delivered
    }

    /// Sends `message` to every connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, message: &ServerMessage) -> usize {
        let Some(payload) = encode(message) else {
            return 0;
        };

        let registry = self.inner.registry.read().await;
        match registry.users.get(&user_id) {
            Some(conns) => deliver_all(&registry, conns.iter(), &payload, message.name()),
            None => 0,
        }
    }

    /// Sends `message` to one connection (control frames to the session's own client).
    pub async fn send_to_connection(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        let Some(payload) = encode(message) else {
            return false;
        };

        let registry = self.inner.registry.read().await;
        deliver_all(&registry, std::iter::once(&id), &payload, message.name()) == 1
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.registry.read().await.connections.len()
    }

    pub async fn subscriber_count(&self, project_id: Uuid) -> usize {
        self.inner
            .registry
            .read()
            .await
            .topics
            .get(&topic_for(project_id))
            .map_or(0, HashSet::len)
    }

    /// Token cancelled when the hub shuts down; sessions select on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Stops accepting connections and drops every outbound queue, which ends
    /// all sessions.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let mut registry = self.inner.registry.write().await;
        let closed = registry.connections.len();
        registry.connections.clear();
        registry.topics.clear();
        registry.users.clear();

        info!(closed_connections = closed, "Realtime hub shut down");
    }
}

fn encode(message: &ServerMessage) -> Option<Outbound> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(event = message.name(), error = %e, "Failed to serialize realtime event");
            None
        }
    }
}

fn deliver_all<'a>(
    registry: &Registry,
    targets: impl Iterator<Item = &'a ConnectionId>,
    payload: &Outbound,
    event: &'static str,
) -> usize {
    let mut delivered = 0;

    for id in targets {
        let Some(connection) = registry.connections.get(id) else {
            continue;
        };

        match connection.sender.try_send(payload.clone()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %id, event, "Outbound queue full, dropping realtime event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %id, event, "Connection closing, dropping realtime event");
            }
        }
    }

    delivered
}
