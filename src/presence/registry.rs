use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::realtime::events::ServerEvent;

/// What the socket writer task consumes.
#[derive(Debug)]
pub enum Outgoing {
    Event(ServerEvent),
    Close,
}

/// Handle to one live socket: an id plus the sending half of its outbound queue.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outgoing>,
    connected_at: OffsetDateTime,
}

impl Connection {
    pub fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Connection {
        Connection {
            id: Uuid::now_v7(),
            tx,
            connected_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> OffsetDateTime {
        self.connected_at
    }

    /// Queues `event`; `false` once the socket is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(Outgoing::Event(event)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

/// Who is connected right now, one connection per user.
///
/// Volatile and process-local; never the source of truth for anything but
/// reachability.
pub trait Sessions: Send + Sync {
    /// Makes `connection` the user's session, returning the one it replaced.
    fn register(&self, user_id: Uuid, connection: Connection) -> Option<Connection>;

    /// Removes the user's session only if it is still `connection_id`.
    fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool;

    fn lookup(&self, user_id: Uuid) -> Option<Connection>;

    fn is_online(&self, user_id: Uuid) -> bool {
        self.lookup(user_id).is_some()
    }

    fn online_count(&self) -> usize;

    /// Best-effort live push.
    fn push(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.lookup(user_id) {
            Some(connection) => connection.send(event),
            None => false,
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Connection>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }
}

impl Sessions for SessionRegistry {
    fn register(&self, user_id: Uuid, connection: Connection) -> Option<Connection> {
        self.sessions.insert(user_id, connection)
    }

    fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        self.sessions
            .remove_if(&user_id, |_, current| current.id == connection_id)
            .is_some()
    }

    fn lookup(&self, user_id: Uuid) -> Option<Connection> {
        self.sessions.get(&user_id).map(|entry| entry.value().clone())
    }

    fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    fn online_count(&self) -> usize {
        self.sessions.len()
    }
}
