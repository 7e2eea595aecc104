use dashmap::DashMap;
use tandem_models::gateway::ServerEvent;
use tandem_models::UserId;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Delivery handle for one live gateway connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub user_name: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_name: String, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            user_name,
            sender,
        }
    }

    pub fn send(&self, event: ServerEvent) {
        // Receiver gone means the write task already exited; nothing to do.
        let _ = self.sender.send(event);
    }
}

/// Maps each user to at most one live connection. A later login for the same
/// user replaces the earlier entry atomically; the displaced handle is
/// returned so the caller can notify and close it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, returning the previous handle if the user
    /// already had a live connection.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.insert(user_id, handle)
    }

    /// Remove the binding for `user_id`, but only if it still belongs to
    /// `conn_id`. A stale disconnect from a superseded connection must never
    /// evict the session that replaced it.
    pub fn unregister(&self, user_id: UserId, conn_id: Uuid) -> bool {
        self.connections
            .remove_if(&user_id, |_, handle| handle.conn_id == conn_id)
            .is_some()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn user_name(&self, user_id: UserId) -> Option<String> {
        self.connections.get(&user_id).map(|h| h.user_name.clone())
    }

    /// Deliver an event to a user's live connection. Returns false if the
    /// user is offline; the event is dropped, replay is pull-based.
    pub fn send_to(&self, user_id: UserId, event: ServerEvent) -> bool {
        match self.connections.get(&user_id) {
            Some(handle) => {
                handle.send(event);
                true
            }
            None => false,
        }
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }
}
