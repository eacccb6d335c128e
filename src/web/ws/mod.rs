//! WebSocket module for real-time communication.
//!
//! One socket carries one chat connection. Frames are JSON
//! `{"event": ..., "data": ...}` objects in both directions.

pub mod chat;

pub use chat::chat_ws_handler;
