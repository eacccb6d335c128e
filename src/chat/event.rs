//! Events exchanged with chat clients.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::db::{MessageView, User};

/// Automated participants that speak in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bot {
    /// Announcements and moderation.
    Drise,
    /// Help and fun commands.
    Nay,
    /// User lookups.
    View,
}

impl Bot {
    pub fn name(&self) -> &'static str {
        match self {
            Bot::Drise => "Drise",
            Bot::Nay => "Nay",
            Bot::View => "View",
        }
    }
}

/// Styling hint for bot messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMessageKind {
    Info,
    Success,
    Help,
    Fun,
    Warning,
    Error,
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendMessage {
    /// Target room name for public messages.
    #[serde(default)]
    pub room: Option<String>,
    pub content: String,
    #[serde(default, rename = "isPrivate")]
    pub is_private: bool,
    #[serde(default, rename = "recipientId")]
    pub recipient_id: Option<i64>,
}

impl SendMessage {
    /// Public message to a room.
    pub fn public(room: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            content: content.into(),
            is_private: false,
            recipient_id: None,
        }
    }

    /// Private message to a user.
    pub fn private(recipient_id: i64, content: impl Into<String>) -> Self {
        Self {
            room: None,
            content: content.into(),
            is_private: true,
            recipient_id: Some(recipient_id),
        }
    }
}

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind an identity using an access token.
    Authenticate(String),
    /// Join a room by name.
    JoinRoom(String),
    /// Leave a room by name.
    LeaveRoom(String),
    SendMessage(SendMessage),
    /// Heartbeat.
    Ping,
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated {
        user: User,
    },
    AuthError {
        message: String,
    },
    AccessDenied {
        room: String,
        message: String,
    },
    ReceiveMessage {
        message: MessageView,
    },
    BotMessage {
        bot: String,
        message: String,
        #[serde(rename = "type")]
        kind: BotMessageKind,
    },
    /// This connection was removed from a room.
    KickUser {
        room: String,
        reason: String,
        by: String,
    },
    /// The server is closing this connection.
    Terminated {
        reason: String,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerEvent {
    /// Create a bot message event.
    pub fn bot(bot: Bot, kind: BotMessageKind, message: impl Into<String>) -> Self {
        ServerEvent::BotMessage {
            bot: bot.name().to_string(),
            message: message.into(),
            kind,
        }
    }

    /// Create an error event.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::AuthError { .. } => "auth_error",
            ServerEvent::AccessDenied { .. } => "access_denied",
            ServerEvent::ReceiveMessage { .. } => "receive_message",
            ServerEvent::BotMessage { .. } => "bot_message",
            ServerEvent::KickUser { .. } => "kick_user",
            ServerEvent::Terminated { .. } => "terminated",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_authenticate() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"authenticate","data":"abc.def"}"#).unwrap();
        assert_eq!(event, ClientEvent::Authenticate("abc.def".to_string()));
    }

    #[test]
    fn test_parse_join_and_leave() {
        let join: ClientEvent =
            serde_json::from_str(r#"{"event":"join_room","data":"general"}"#).unwrap();
        assert_eq!(join, ClientEvent::JoinRoom("general".to_string()));

        let leave: ClientEvent =
            serde_json::from_str(r#"{"event":"leave_room","data":"general"}"#).unwrap();
        assert_eq!(leave, ClientEvent::LeaveRoom("general".to_string()));
    }

    #[test]
    fn test_parse_send_message_public() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"room":"general","content":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessage::public("general", "hello"))
        );
    }

    #[test]
    fn test_parse_send_message_private() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"content":"psst","isPrivate":true,"recipientId":4}}"#,
        )
        .unwrap();
        assert_eq!(event, ClientEvent::SendMessage(SendMessage::private(4, "psst")));
    }

    #[test]
    fn test_parse_ping() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(event, ClientEvent::Ping);
    }

    #[test]
    fn test_parse_unknown_event() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"dance","data":1}"#).is_err());
    }

    #[test]
    fn test_serialize_bot_message() {
        let event = ServerEvent::bot(Bot::Nay, BotMessageKind::Fun, "alice hugs bob");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "bot_message",
                "data": {"bot": "Nay", "message": "alice hugs bob", "type": "fun"}
            })
        );
    }

    #[test]
    fn test_serialize_access_denied() {
        let event = ServerEvent::AccessDenied {
            room: "moderation".to_string(),
            message: "private room".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "access_denied");
        assert_eq!(value["data"]["room"], "moderation");
        assert_eq!(event.name(), "access_denied");
    }

    #[test]
    fn test_serialize_pong() {
        let value = serde_json::to_value(ServerEvent::Pong).unwrap();
        assert_eq!(value["event"], "pong");
    }
}
