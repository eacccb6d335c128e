//! Message storage.
//!
//! Messages are immutable once stored. Every read joins the author so that
//! clients receive display metadata rather than bare user ids.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::user::Role;
use super::{parse_db_time, to_db_time, DbPool};
use crate::{Result, TalkingError};

/// Where a message goes. Exactly one of a room or a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    /// Public message in a room.
    Room(i64),
    /// Private message to a user.
    Recipient(i64),
}

impl MessageTarget {
    fn columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            MessageTarget::Room(id) => (Some(id), None),
            MessageTarget::Recipient(id) => (None, Some(id)),
        }
    }
}

/// Data for storing a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author_id: i64,
    pub target: MessageTarget,
    pub content: String,
    pub mentioned_users: Vec<i64>,
}

/// A stored message joined with its author's display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub room_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub is_private: bool,
    pub mentioned_users: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub pseudo: String,
    pub gender: String,
    pub verified: bool,
    pub verification_badge: Option<String>,
    pub role: Role,
}

impl MessageView {
    /// The target this message was stored with.
    pub fn target(&self) -> Option<MessageTarget> {
        match (self.room_id, self.recipient_id) {
            (Some(room), None) => Some(MessageTarget::Room(room)),
            (None, Some(recipient)) => Some(MessageTarget::Recipient(recipient)),
            _ => None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageViewRow {
    id: i64,
    content: String,
    user_id: i64,
    room_id: Option<i64>,
    recipient_id: Option<i64>,
    mentioned_users: Option<String>,
    created_at: String,
    pseudo: String,
    gender: String,
    verified: bool,
    verification_badge: Option<String>,
    role: String,
}

impl From<MessageViewRow> for MessageView {
    fn from(row: MessageViewRow) -> Self {
        let mentioned_users = row
            .mentioned_users
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();

        Self {
            id: row.id,
            content: row.content,
            user_id: row.user_id,
            room_id: row.room_id,
            is_private: row.recipient_id.is_some(),
            recipient_id: row.recipient_id,
            mentioned_users,
            created_at: parse_db_time(&row.created_at).unwrap_or_else(Utc::now),
            pseudo: row.pseudo,
            gender: row.gender,
            verified: row.verified,
            verification_badge: row.verification_badge,
            role: row.role.parse().unwrap_or_default(),
        }
    }
}

const VIEW_SELECT: &str = "SELECT m.id, m.content, m.user_id, m.room_id, m.recipient_id,
                                  m.mentioned_users, m.created_at,
                                  u.pseudo, u.gender, u.verified, u.verification_badge, u.role
                           FROM messages m JOIN users u ON m.user_id = u.id";

/// Repository for messages.
pub struct MessageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store a message and return it denormalized.
    pub async fn create(&self, new_message: &NewMessage) -> Result<MessageView> {
        let (room_id, recipient_id) = new_message.target.columns();
        let mentioned = if new_message.mentioned_users.is_empty() {
            None
        } else {
            serde_json::to_string(&new_message.mentioned_users).ok()
        };

        let result = sqlx::query(
            "INSERT INTO messages (content, user_id, room_id, recipient_id, mentioned_users, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_message.content)
        .bind(new_message.author_id)
        .bind(room_id)
        .bind(recipient_id)
        .bind(mentioned)
        .bind(to_db_time(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| TalkingError::NotFound("message".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<MessageView>> {
        let sql = format!("{VIEW_SELECT} WHERE m.id = ?");
        let row = sqlx::query_as::<_, MessageViewRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(MessageView::from))
    }

    /// The latest `limit` public messages of a room, oldest first.
    pub async fn find_by_room(&self, room_id: i64, limit: u32) -> Result<Vec<MessageView>> {
        let sql = format!("{VIEW_SELECT} WHERE m.room_id = ? ORDER BY m.id DESC LIMIT ?");
        let rows = sqlx::query_as::<_, MessageViewRow>(&sql)
            .bind(room_id)
            .bind(i64::from(limit))
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        let mut messages: Vec<MessageView> = rows.into_iter().map(MessageView::from).collect();
        messages.reverse();
        Ok(messages)
    }

    /// The latest `limit` private messages between two users, oldest first.
    pub async fn find_private(&self, user_a: i64, user_b: i64, limit: u32) -> Result<Vec<MessageView>> {
        let sql = format!(
            "{VIEW_SELECT}
             WHERE (m.user_id = ? AND m.recipient_id = ?)
                OR (m.user_id = ? AND m.recipient_id = ?)
             ORDER BY m.id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MessageViewRow>(&sql)
            .bind(user_a)
            .bind(user_b)
            .bind(user_b)
            .bind(user_a)
            .bind(i64::from(limit))
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        let mut messages: Vec<MessageView> = rows.into_iter().map(MessageView::from).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Delete a message. Returns false if it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
