//! Message routing.
//!
//! Decides where an incoming `send_message` goes: the command dispatcher, a
//! private conversation, or a room broadcast.

use std::sync::Arc;

use tracing::debug;

use super::access::RoomAccessController;
use super::command::CommandDispatcher;
use super::event::{SendMessage, ServerEvent};
use super::session::{ConnectionId, SessionGateway};
use crate::db::{Database, MessageRepository, MessageTarget, NewMessage, RoomRepository, UserRepository};
use crate::{Result, TalkingError};

/// What happened to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Consumed by the command dispatcher.
    Command,
    /// Stored and pushed to this many connections.
    Private { delivered: usize },
    Public { delivered: usize },
}

/// Pseudos mentioned with `@name`, in order of first appearance.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let Some(name) = word.strip_prefix('@') else {
            continue;
        };
        let name = name.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'));
        if name.is_empty() || mentions.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            continue;
        }
        mentions.push(name.to_string());
    }
    mentions
}

pub struct MessageRouter {
    db: Database,
    sessions: Arc<SessionGateway>,
    commands: CommandDispatcher,
}

impl MessageRouter {
    pub fn new(db: Database, sessions: Arc<SessionGateway>, commands: CommandDispatcher) -> Self {
        Self {
            db,
            sessions,
            commands,
        }
    }

    pub async fn send(&self, conn: ConnectionId, payload: SendMessage) -> Result<Delivery> {
        let identity = self.sessions.require_identity(conn).await?;

        let content = payload.content.trim();
        if content.is_empty() {
            return Err(TalkingError::Validation("message is empty".to_string()));
        }

        let users = UserRepository::new(self.db.pool());
        let rooms = RoomRepository::new(self.db.pool());
        let sender = users
            .get_by_id(identity.user_id)
            .await?
            .ok_or_else(|| TalkingError::Authentication("user no longer exists".to_string()))?;

        if content.starts_with(self.commands.prefix()) {
            let room = match payload.room.as_deref() {
                Some(name) => rooms.get_by_name(name).await?,
                None => None,
            };
            if self.commands.dispatch(content, &sender, room.as_ref()).await? {
                return Ok(Delivery::Command);
            }
        }

        let mut mentioned_users = Vec::new();
        for pseudo in extract_mentions(content) {
            if let Some(user) = users.get_by_pseudo(&pseudo).await? {
                if !mentioned_users.contains(&user.id) {
                    mentioned_users.push(user.id);
                }
            }
        }
        let messages = MessageRepository::new(self.db.pool());

        if let (true, Some(recipient_id)) = (payload.is_private, payload.recipient_id) {
            let recipient = users
                .get_by_id(recipient_id)
                .await?
                .ok_or_else(|| TalkingError::NotFound("recipient".to_string()))?;

            let message = messages
                .create(&NewMessage {
                    author_id: sender.id,
                    target: MessageTarget::Recipient(recipient.id),
                    content: content.to_string(),
                    mentioned_users,
                })
                .await?;

            let event = ServerEvent::ReceiveMessage { message };
            let mut delivered = self.sessions.send_to_user(sender.id, event.clone()).await;
            if recipient.id != sender.id {
                delivered += self.sessions.send_to_user(recipient.id, event).await;
            }
            debug!("Private message {} -> {}", sender.pseudo, recipient.pseudo);
            return Ok(Delivery::Private { delivered });
        }

        let name = payload
            .room
            .as_deref()
            .ok_or_else(|| TalkingError::Validation("a room is required".to_string()))?;
        let room = rooms
            .get_by_name(name)
            .await?
            .ok_or_else(|| TalkingError::NotFound(format!("room {name}")))?;

        RoomAccessController::new(self.db.pool())
            .check(&sender, &room)
            .await?;

        let message = messages
            .create(&NewMessage {
                author_id: sender.id,
                target: MessageTarget::Room(room.id),
                content: content.to_string(),
                mentioned_users,
            })
            .await?;

        let delivered = self
            .sessions
            .broadcast_room(room.id, ServerEvent::ReceiveMessage { message })
            .await;
        Ok(Delivery::Public { delivered })
    }
}
