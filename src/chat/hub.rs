//! Chat hub.
//!
//! Entry point for the transport: turns client events into calls on the
//! session gateway, the router and the moderation executor, and turns their
//! failures into events for the client.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::access::{Admission, RoomAccessController};
use super::command::CommandDispatcher;
use super::event::{Bot, BotMessageKind, ClientEvent, ServerEvent};
use super::moderation::ModerationExecutor;
use super::router::MessageRouter;
use super::session::{ConnectionId, SessionGateway};
use crate::auth::AuthVerifier;
use crate::config::Config;
use crate::db::{Database, MessageRepository, MessageView, Room, RoomRepository, User, UserRepository};
use crate::{Result, TalkingError};

pub struct ChatHub {
    db: Database,
    sessions: Arc<SessionGateway>,
    moderation: Arc<ModerationExecutor>,
    router: MessageRouter,
    history_limit: u32,
}

impl ChatHub {
    pub fn new(db: Database, verifier: Arc<dyn AuthVerifier>, config: &Config) -> Self {
        let sessions = Arc::new(SessionGateway::new(db.clone(), verifier));
        let moderation = Arc::new(ModerationExecutor::new(
            db.clone(),
            Arc::clone(&sessions),
            config.moderation.auto_role_policy,
        ));
        let commands = CommandDispatcher::new(
            db.clone(),
            Arc::clone(&sessions),
            Arc::clone(&moderation),
            &config.chat,
            &config.moderation,
        );
        let router = MessageRouter::new(db.clone(), Arc::clone(&sessions), commands);

        Self {
            db,
            sessions,
            moderation,
            router,
            history_limit: config.chat.history_limit,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionGateway> {
        &self.sessions
    }

    pub fn moderation(&self) -> &Arc<ModerationExecutor> {
        &self.moderation
    }

    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.sessions.connect().await
    }

    pub async fn disconnect(&self, conn: ConnectionId) {
        self.sessions.disconnect(conn).await;
    }

    /// Handle one client event. Failures are reported to the client and
    /// never close the connection.
    pub async fn handle(&self, conn: ConnectionId, event: ClientEvent) {
        let room = match &event {
            ClientEvent::JoinRoom(name) | ClientEvent::LeaveRoom(name) => Some(name.clone()),
            ClientEvent::SendMessage(payload) => payload.room.clone(),
            _ => None,
        };

        let result = match event {
            ClientEvent::Authenticate(token) => self.authenticate(conn, &token).await,
            ClientEvent::JoinRoom(name) => self.join_room(conn, &name).await,
            ClientEvent::LeaveRoom(name) => self.leave_room(conn, &name).await,
            ClientEvent::SendMessage(payload) => self.router.send(conn, payload).await.map(|_| ()),
            ClientEvent::Ping => {
                self.sessions.send_to(conn, ServerEvent::Pong).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(conn, room, e).await;
        }
    }

    /// Latest public messages of a room, oldest first.
    pub async fn room_history(&self, room_name: &str) -> Result<Vec<MessageView>> {
        let room = RoomRepository::new(self.db.pool())
            .get_by_name(room_name)
            .await?
            .ok_or_else(|| TalkingError::NotFound(format!("room {room_name}")))?;
        MessageRepository::new(self.db.pool())
            .find_by_room(room.id, self.history_limit)
            .await
    }

    /// Latest private messages between the connection's user and another.
    pub async fn conversation(&self, conn: ConnectionId, other_id: i64) -> Result<Vec<MessageView>> {
        let identity = self.sessions.require_identity(conn).await?;
        MessageRepository::new(self.db.pool())
            .find_private(identity.user_id, other_id, self.history_limit)
            .await
    }

    async fn authenticate(&self, conn: ConnectionId, token: &str) -> Result<()> {
        let user = self.sessions.authenticate(conn, token).await?;
        self.sessions
            .send_to(conn, ServerEvent::Authenticated { user })
            .await;
        Ok(())
    }

    async fn join_room(&self, conn: ConnectionId, name: &str) -> Result<()> {
        let (user, room) = self.load(conn, name).await?;

        if let Admission::Denied(reason) = RoomAccessController::new(self.db.pool())
            .can_join(&user, &room)
            .await?
        {
            self.sessions
                .send_to(
                    conn,
                    ServerEvent::AccessDenied {
                        room: room.name.clone(),
                        message: reason.message(),
                    },
                )
                .await;
            return Ok(());
        }

        if !self.sessions.join(conn, room.id).await? {
            return Ok(());
        }
        info!("{} joined {}", user.pseudo, room.name);

        let mut role = user.role;
        match self.moderation.apply_auto_role(&user, &room).await {
            Ok(Some(applied)) => role = role.max(applied),
            Ok(None) => {}
            Err(e) => error!("Failed to apply auto role for {}: {}", user.pseudo, e),
        }
        let role = role.max(self.moderation.effective_role(&user, Some(&room)).await);

        self.sessions
            .broadcast_room(
                room.id,
                ServerEvent::bot(
                    Bot::Drise,
                    BotMessageKind::Info,
                    format!("{}{} joined the room", role.prefix(), user.pseudo),
                ),
            )
            .await;
        Ok(())
    }

    async fn leave_room(&self, conn: ConnectionId, name: &str) -> Result<()> {
        let (user, room) = self.load(conn, name).await?;

        if self.sessions.leave(conn, room.id).await {
            info!("{} left {}", user.pseudo, room.name);
            self.sessions
                .broadcast_room(
                    room.id,
                    ServerEvent::bot(
                        Bot::Drise,
                        BotMessageKind::Info,
                        format!("{} left the room", user.pseudo),
                    ),
                )
                .await;
        }
        Ok(())
    }

    async fn load(&self, conn: ConnectionId, room_name: &str) -> Result<(User, Room)> {
        let identity = self.sessions.require_identity(conn).await?;
        let user = UserRepository::new(self.db.pool())
            .get_by_id(identity.user_id)
            .await?
            .ok_or_else(|| TalkingError::Authentication("user no longer exists".to_string()))?;
        let room = RoomRepository::new(self.db.pool())
            .get_by_name(room_name)
            .await?
            .ok_or_else(|| TalkingError::NotFound(format!("room {room_name}")))?;
        Ok((user, room))
    }

    async fn report(&self, conn: ConnectionId, room: Option<String>, e: TalkingError) {
        let event = match &e {
            TalkingError::Authentication(message) => ServerEvent::AuthError {
                message: message.clone(),
            },
            e if e.is_access_denial() => ServerEvent::AccessDenied {
                room: room.unwrap_or_default(),
                message: e.to_string(),
            },
            TalkingError::NotFound(_) | TalkingError::Validation(_) => {
                ServerEvent::error(e.code(), e.to_string())
            }
            TalkingError::Authorization(_) => {
                ServerEvent::bot(Bot::Drise, BotMessageKind::Warning, e.to_string())
            }
            _ => {
                error!("Connection {}: {}", conn, e);
                return;
            }
        };

        warn!("Connection {}: {}", conn, e);
        self.sessions.send_to(conn, event).await;
    }
}
