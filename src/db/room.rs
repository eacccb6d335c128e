//! Room records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::{parse_db_time, to_db_time, DbPool};
use crate::{Result, TalkingError};

const ROOM_COLUMNS: &str = "id, name, topic, is_private, is_age_restricted, min_age, max_age,
                            password, created_by, created_at";

/// A named broadcast channel.
#[derive(Debug, Clone, Serialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub topic: String,
    /// Only elevated roles may join.
    pub is_private: bool,
    /// Baseline users must be within `[min_age, max_age]`.
    pub is_age_restricted: bool,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Whether an age falls within the room's range. Missing bounds are open.
    pub fn admits_age(&self, age: i32) -> bool {
        let above_min = self.min_age.map_or(true, |min| age >= min as i32);
        let below_max = self.max_age.map_or(true, |max| age <= max as i32);
        above_min && below_max
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: i64,
    name: String,
    topic: String,
    is_private: bool,
    is_age_restricted: bool,
    min_age: Option<i64>,
    max_age: Option<i64>,
    password: Option<String>,
    created_by: Option<i64>,
    created_at: String,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            topic: row.topic,
            is_private: row.is_private,
            is_age_restricted: row.is_age_restricted,
            min_age: row.min_age.and_then(|v| u32::try_from(v).ok()),
            max_age: row.max_age.and_then(|v| u32::try_from(v).ok()),
            password: row.password,
            created_by: row.created_by,
            created_at: parse_db_time(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Data for creating a room.
#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    pub name: String,
    pub topic: String,
    pub is_private: bool,
    pub is_age_restricted: bool,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub password: Option<String>,
    pub created_by: Option<i64>,
}

impl NewRoom {
    /// Create an open room.
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Restrict to elevated roles.
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Restrict baseline users to an age range.
    pub fn age_range(mut self, min_age: Option<u32>, max_age: Option<u32>) -> Self {
        self.is_age_restricted = true;
        self.min_age = min_age;
        self.max_age = max_age;
        self
    }

    /// Set a join password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Record the creator.
    pub fn created_by(mut self, user_id: i64) -> Self {
        self.created_by = Some(user_id);
        self
    }
}

/// Rooms created on first start.
pub fn default_rooms() -> Vec<NewRoom> {
    vec![
        NewRoom::new("general", "General discussion"),
        NewRoom::new("teens", "Reserved for ages 11-17").age_range(Some(11), Some(17)),
        NewRoom::new("help", "Help and support"),
        NewRoom::new("moderation", "Moderation room").private(),
    ]
}

/// Repository for room records.
pub struct RoomRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RoomRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a room. Names are unique.
    pub async fn create(&self, new_room: &NewRoom) -> Result<Room> {
        let result = sqlx::query(
            "INSERT INTO rooms (name, topic, is_private, is_age_restricted, min_age, max_age,
                                password, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_room.name)
        .bind(&new_room.topic)
        .bind(new_room.is_private)
        .bind(new_room.is_age_restricted)
        .bind(new_room.min_age.map(i64::from))
        .bind(new_room.max_age.map(i64::from))
        .bind(&new_room.password)
        .bind(new_room.created_by)
        .bind(to_db_time(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| TalkingError::NotFound("room".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(Room::from))
    }

    /// Look a room up by its exact name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE name = ?");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(Room::from))
    }

    /// All rooms, by name.
    pub async fn list(&self) -> Result<Vec<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms ORDER BY name");
        let rows = sqlx::query_as::<_, RoomRow>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
            .fetch_one(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(count)
    }

    /// Admin update of a room topic. Returns false if the room does not exist.
    pub async fn update_topic(&self, id: i64, topic: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE rooms SET topic = ? WHERE id = ?")
            .bind(topic)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert the default rooms when the table is empty.
    ///
    /// Returns how many rooms were created.
    pub async fn seed_defaults(&self) -> Result<usize> {
        if self.count().await? > 0 {
            return Ok(0);
        }

        let rooms = default_rooms();
        for room in &rooms {
            self.create(room).await?;
        }
        info!("Seeded {} default rooms", rooms.len());
        Ok(rooms.len())
    }
}
