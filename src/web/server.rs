//! Web server for TALKING.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::router::{create_health_router, create_router};
use crate::chat::ChatHub;
use crate::config::ServerConfig;
use crate::{Result, TalkingError};

/// Web server hosting the chat endpoint.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    hub: Arc<ChatHub>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &ServerConfig, hub: Arc<ChatHub>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| TalkingError::Config(format!("invalid server address: {e}")))?;
        Ok(Self { addr, hub })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the web server until it fails.
    pub async fn run(self) -> Result<()> {
        let router = create_router(self.hub).merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Chat server listening on ws://{}/ws", local_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let router = create_router(self.hub).merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Chat server listening on ws://{}/ws", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Chat server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
