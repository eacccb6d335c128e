//! Auto roles: a role granted to a user when they enter a given room.

use chrono::Utc;

use super::user::Role;
use super::{to_db_time, DbPool};
use crate::{Result, TalkingError};

/// One (user, room) → role entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoRole {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub role: Role,
}

#[derive(sqlx::FromRow)]
struct AutoRoleRow {
    id: i64,
    user_id: i64,
    room_id: i64,
    role: String,
}

impl From<AutoRoleRow> for AutoRole {
    fn from(row: AutoRoleRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            room_id: row.room_id,
            role: row.role.parse().unwrap_or_default(),
        }
    }
}

/// Repository for auto roles. At most one entry per (user, room).
pub struct AutoRoleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AutoRoleRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, user_id: i64, room_id: i64) -> Result<Option<AutoRole>> {
        let row = sqlx::query_as::<_, AutoRoleRow>(
            "SELECT id, user_id, room_id, role FROM auto_roles WHERE user_id = ? AND room_id = ?",
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(AutoRole::from))
    }

    /// Insert or replace the entry for (user, room).
    pub async fn set(&self, user_id: i64, room_id: i64, role: Role) -> Result<AutoRole> {
        sqlx::query(
            "INSERT INTO auto_roles (user_id, room_id, role, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id, room_id) DO UPDATE SET role = excluded.role",
        )
        .bind(user_id)
        .bind(room_id)
        .bind(role.as_str())
        .bind(to_db_time(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        self.find(user_id, room_id)
            .await?
            .ok_or_else(|| TalkingError::NotFound("auto role".to_string()))
    }

    /// Returns false if there was no entry.
    pub async fn remove(&self, user_id: i64, room_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auto_roles WHERE user_id = ? AND room_id = ?")
            .bind(user_id)
            .bind(room_id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Every entry for a room.
    pub async fn list_for_room(&self, room_id: i64) -> Result<Vec<AutoRole>> {
        let rows = sqlx::query_as::<_, AutoRoleRow>(
            "SELECT id, user_id, room_id, role FROM auto_roles WHERE room_id = ? ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(AutoRole::from).collect())
    }
}
