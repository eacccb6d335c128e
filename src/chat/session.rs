//! Session gateway.
//!
//! Owns the registry of live connections: which identity each connection is
//! bound to, which rooms it has joined, and the outbox its events go to.
//! No other component reads or writes connection state directly.
//!
//! Outboxes are unbounded, so fanning out never waits on a slow peer, and the
//! registry lock is never held across a database call.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::event::{Bot, BotMessageKind, ServerEvent};
use crate::auth::AuthVerifier;
use crate::db::{Database, Room, User, UserRepository};
use crate::{Result, TalkingError};

/// Identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a connection is speaking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub pseudo: String,
}

struct Connection {
    identity: Option<Identity>,
    rooms: HashSet<i64>,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    fn deliver(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }

    fn is_user(&self, user_id: i64) -> bool {
        self.identity.as_ref().is_some_and(|id| id.user_id == user_id)
    }
}

/// What an identity leaves behind when a connection stops speaking for it.
struct Departure {
    identity: Identity,
    /// Rooms no other connection of the user is still in.
    rooms: Vec<i64>,
    last_connection: bool,
}

impl Departure {
    /// Must be built after the departing connection is out of the registry
    /// or bound to someone else.
    fn new(connections: &HashMap<ConnectionId, Connection>, identity: Identity, rooms: HashSet<i64>) -> Self {
        let remaining: Vec<&Connection> = connections
            .values()
            .filter(|c| c.is_user(identity.user_id))
            .collect();
        let rooms = rooms
            .into_iter()
            .filter(|room_id| !remaining.iter().any(|c| c.rooms.contains(room_id)))
            .collect();
        Self {
            last_connection: remaining.is_empty(),
            identity,
            rooms,
        }
    }
}

/// Registry of live connections and their lifecycle operations.
pub struct SessionGateway {
    db: Database,
    verifier: Arc<dyn AuthVerifier>,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl SessionGateway {
    pub fn new(db: Database, verifier: Arc<dyn AuthVerifier>) -> Self {
        Self {
            db,
            verifier,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new anonymous connection.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        self.connections.write().await.insert(
            id,
            Connection {
                identity: None,
                rooms: HashSet::new(),
                outbox: tx,
            },
        );
        debug!("Connection {} opened", id);
        (id, rx)
    }

    /// Verify a token and bind its user to the connection.
    ///
    /// A failed attempt leaves the connection as it was. Authenticating again
    /// rebinds; switching to a different user makes the previous one leave
    /// its rooms, as on disconnect.
    pub async fn authenticate(&self, conn: ConnectionId, token: &str) -> Result<User> {
        let claims = self.verifier.verify(token)?;

        let users = UserRepository::new(self.db.pool());
        let user = users
            .get_by_id(claims.sub)
            .await?
            .ok_or_else(|| TalkingError::Authentication("user no longer exists".to_string()))?;

        let departure = {
            let mut connections = self.connections.write().await;
            let connection = connections
                .get_mut(&conn)
                .ok_or_else(|| TalkingError::Authentication("connection closed".to_string()))?;
            let previous = if connection.is_user(user.id) {
                None
            } else {
                let rooms = std::mem::take(&mut connection.rooms);
                connection.identity.take().map(|identity| (identity, rooms))
            };
            connection.identity = Some(Identity {
                user_id: user.id,
                pseudo: user.pseudo.clone(),
            });
            previous.map(|(identity, rooms)| Departure::new(&connections, identity, rooms))
        };
        if let Some(departure) = departure {
            self.depart(departure).await;
        }

        users.set_online(user.id).await?;
        info!("Connection {} authenticated as {}", conn, user.pseudo);

        Ok(User {
            online: true,
            ..user
        })
    }

    /// The identity bound to a connection, if any.
    pub async fn identity(&self, conn: ConnectionId) -> Option<Identity> {
        self.connections
            .read()
            .await
            .get(&conn)
            .and_then(|c| c.identity.clone())
    }

    /// The bound identity, or an authentication error.
    pub async fn require_identity(&self, conn: ConnectionId) -> Result<Identity> {
        self.identity(conn)
            .await
            .ok_or_else(|| TalkingError::Authentication("not authenticated".to_string()))
    }

    /// Add a room membership. Returns false if it already existed.
    pub async fn join(&self, conn: ConnectionId, room_id: i64) -> Result<bool> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&conn)
            .filter(|c| c.identity.is_some())
            .ok_or_else(|| TalkingError::Authentication("not authenticated".to_string()))?;
        Ok(connection.rooms.insert(room_id))
    }

    /// Remove a room membership. Returns false if there was none.
    pub async fn leave(&self, conn: ConnectionId, room_id: i64) -> bool {
        self.connections
            .write()
            .await
            .get_mut(&conn)
            .is_some_and(|c| c.rooms.remove(&room_id))
    }

    pub async fn is_member(&self, conn: ConnectionId, room_id: i64) -> bool {
        self.connections
            .read()
            .await
            .get(&conn)
            .is_some_and(|c| c.rooms.contains(&room_id))
    }

    /// Close a connection.
    ///
    /// Rooms the user no longer has any connection in get a leave
    /// announcement. The user is marked offline once their last connection is
    /// gone. Storage failures are logged only.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let departure = {
            let mut connections = self.connections.write().await;
            let Some(removed) = connections.remove(&conn) else {
                return;
            };
            removed
                .identity
                .map(|identity| Departure::new(&connections, identity, removed.rooms))
        };
        debug!("Connection {} closed", conn);

        if let Some(departure) = departure {
            self.depart(departure).await;
        }
    }

    async fn depart(&self, departure: Departure) {
        let Departure {
            identity,
            rooms,
            last_connection,
        } = departure;

        for room_id in rooms {
            self.broadcast_room(
                room_id,
                ServerEvent::bot(
                    Bot::Drise,
                    BotMessageKind::Info,
                    format!("{} left the room", identity.pseudo),
                ),
            )
            .await;
        }

        if !last_connection {
            return;
        }

        let users = UserRepository::new(self.db.pool());
        if let Err(e) = users.set_offline(identity.user_id, Utc::now()).await {
            error!("Failed to mark {} offline: {}", identity.pseudo, e);
        }
        info!("{} disconnected", identity.pseudo);
    }

    /// Forcibly close every connection of a user.
    ///
    /// Each connection gets a `terminated` event before it is released.
    /// Returns how many connections were closed.
    pub async fn terminate(&self, user_id: i64, reason: &str) -> usize {
        let targets: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, c)| c.is_user(user_id))
                .map(|(id, c)| {
                    c.deliver(ServerEvent::Terminated {
                        reason: reason.to_string(),
                    });
                    *id
                })
                .collect()
        };

        for conn in &targets {
            self.disconnect(*conn).await;
        }

        if !targets.is_empty() {
            info!("Terminated {} connection(s) of user {}", targets.len(), user_id);
        }
        targets.len()
    }

    /// Remove a user's connections from one room, leaving other rooms alone.
    ///
    /// Each evicted connection gets a `kick_user` event. Returns how many
    /// connections were evicted.
    pub async fn evict(&self, user_id: i64, room: &Room, reason: &str, by: &str) -> usize {
        let mut connections = self.connections.write().await;
        let mut evicted = 0;
        for connection in connections.values_mut() {
            if connection.is_user(user_id) && connection.rooms.remove(&room.id) {
                connection.deliver(ServerEvent::KickUser {
                    room: room.name.clone(),
                    reason: reason.to_string(),
                    by: by.to_string(),
                });
                evicted += 1;
            }
        }
        evicted
    }

    /// Send to every connection joined to a room. Returns the delivery count.
    pub async fn broadcast_room(&self, room_id: i64, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.rooms.contains(&room_id))
            .filter(|c| c.deliver(event.clone()))
            .count()
    }

    /// Send to every connection bound to a user. Returns the delivery count.
    pub async fn send_to_user(&self, user_id: i64, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.is_user(user_id))
            .filter(|c| c.deliver(event.clone()))
            .count()
    }

    /// Send to one connection.
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.connections
            .read()
            .await
            .get(&conn)
            .is_some_and(|c| c.deliver(event))
    }

    /// Whether the user has at least one live authenticated connection.
    pub async fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .read()
            .await
            .values()
            .any(|c| c.is_user(user_id))
    }

    /// Number of connections joined to a room.
    pub async fn connections_in_room(&self, room_id: i64) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.rooms.contains(&room_id))
            .count()
    }

    /// Number of live connections, authenticated or not.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
