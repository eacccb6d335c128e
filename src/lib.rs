//! TALKING - real-time chat server
//!
//! Rooms, private messages, bot commands and a six-level role hierarchy,
//! served over WebSocket.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod web;

pub use auth::{
    can_ban, can_kick, can_mute, can_set_role, check_permission, has_permission, AuthVerifier,
    Claims, JwtVerifier, PermissionError,
};
pub use chat::ChatHub;
pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository};
pub use error::{Result, TalkingError};
