//! Chat module for TALKING.
//!
//! This module provides the real-time chat core:
//! - Session gateway owning every live connection
//! - Room admission (bans, private rooms, age ranges)
//! - Message routing for room and private messages
//! - Bot commands and moderation actions

mod access;
mod command;
mod event;
mod hub;
mod moderation;
mod router;
mod session;

pub use access::{evaluate, Admission, DenyReason, RoomAccessController};
pub use command::{
    format_help, format_seen, format_whois, parse_command, BotCommand, CommandCategory,
    CommandDispatcher, CommandInfo, CommandKind,
};
pub use event::{Bot, BotMessageKind, ClientEvent, SendMessage, ServerEvent};
pub use hub::ChatHub;
pub use moderation::{BanDuration, ModerationExecutor};
pub use router::{extract_mentions, Delivery, MessageRouter};
pub use session::{ConnectionId, Identity, SessionGateway};
