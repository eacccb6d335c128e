//! Test helpers for chat integration tests.
//!
//! Provides an in-memory hub, user fixtures, token minting and a
//! channel-backed test client.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::sync::mpsc::{self, error::TryRecvError};

use talking::chat::{ChatHub, ClientEvent, ConnectionId, SendMessage, ServerEvent};
use talking::config::{AutoRolePolicy, Config};
use talking::db::{NewRoom, NewUser, Role, Room, RoomRepository, User, UserRepository};
use talking::{Claims, Database, JwtVerifier};

/// Secret shared by the hub and minted tokens.
pub const SECRET: &str = "test-secret-key-for-testing-only";

/// Create a test configuration.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = SECRET.to_string();
    config
}

/// Test chat backed by an in-memory database with the default rooms.
pub struct TestChat {
    pub hub: Arc<ChatHub>,
    pub db: Database,
}

impl TestChat {
    pub async fn new() -> Self {
        Self::with_config(create_test_config()).await
    }

    pub async fn with_policy(policy: AutoRolePolicy) -> Self {
        let mut config = create_test_config();
        config.moderation.auto_role_policy = policy;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = Database::open_in_memory().await.unwrap();
        RoomRepository::new(db.pool()).seed_defaults().await.unwrap();
        let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
        let hub = Arc::new(ChatHub::new(db.clone(), verifier, &config));
        Self { hub, db }
    }

    /// Create an adult user with the given role.
    pub async fn user(&self, pseudo: &str, role: Role) -> User {
        self.user_born(pseudo, role, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
            .await
    }

    pub async fn user_born(&self, pseudo: &str, role: Role, birthdate: NaiveDate) -> User {
        UserRepository::new(self.db.pool())
            .create(&NewUser::new(pseudo, birthdate).with_role(role))
            .await
            .unwrap()
    }

    /// Reload a user from storage.
    pub async fn reload(&self, user: &User) -> User {
        UserRepository::new(self.db.pool())
            .get_by_id(user.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn room(&self, name: &str) -> Room {
        RoomRepository::new(self.db.pool())
            .get_by_name(name)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Room {
        RoomRepository::new(self.db.pool())
            .create(&new_room)
            .await
            .unwrap()
    }

    /// Open an anonymous connection.
    pub async fn connect(&self) -> TestClient {
        let (conn, rx) = self.hub.connect().await;
        TestClient {
            hub: Arc::clone(&self.hub),
            conn,
            rx,
        }
    }

    /// Open a connection, authenticate it and discard the greeting.
    pub async fn login(&self, user: &User) -> TestClient {
        let mut client = self.connect().await;
        client.send(ClientEvent::Authenticate(mint_token(user))).await;
        assert!(
            matches!(client.events().as_slice(), [ServerEvent::Authenticated { .. }]),
            "login failed for {}",
            user.pseudo
        );
        client
    }

    /// Log in and join a room, discarding the join announcement.
    pub async fn login_and_join(&self, user: &User, room: &str) -> TestClient {
        let mut client = self.login(user).await;
        client.join(room).await;
        client.events();
        client
    }
}

/// A hub connection whose outbox is read directly.
pub struct TestClient {
    hub: Arc<ChatHub>,
    pub conn: ConnectionId,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    pub async fn send(&self, event: ClientEvent) {
        self.hub.handle(self.conn, event).await;
    }

    pub async fn join(&self, room: &str) {
        self.send(ClientEvent::JoinRoom(room.to_string())).await;
    }

    pub async fn leave(&self, room: &str) {
        self.send(ClientEvent::LeaveRoom(room.to_string())).await;
    }

    pub async fn say(&self, room: &str, content: &str) {
        self.send(ClientEvent::SendMessage(SendMessage::public(room, content)))
            .await;
    }

    pub async fn whisper(&self, recipient: &User, content: &str) {
        self.send(ClientEvent::SendMessage(SendMessage::private(recipient.id, content)))
            .await;
    }

    pub async fn disconnect(&self) {
        self.hub.disconnect(self.conn).await;
    }

    /// Every event queued so far.
    pub fn events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Bot message texts queued so far, other events dropped.
    pub fn bot_messages(&mut self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::BotMessage { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Whether the hub has released this connection.
    pub fn is_closed(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }
}

/// Mint a valid token for a user.
pub fn mint_token(user: &User) -> String {
    mint_token_with_exp(user, Utc::now().timestamp() as u64 + 3600)
}

pub fn mint_token_with_exp(user: &User, exp: u64) -> String {
    let claims = Claims {
        sub: user.id,
        pseudo: user.pseudo.clone(),
        role: user.role.as_str().to_string(),
        iat: Utc::now().timestamp() as u64,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}
