//! Web transport for TALKING.
//!
//! This module exposes the chat hub over a WebSocket endpoint, plus a
//! health check for load balancers.

pub mod router;
pub mod server;
pub mod ws;

pub use router::{create_health_router, create_router};
pub use server::WebServer;
