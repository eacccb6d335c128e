//! Ban ledger.
//!
//! A ban without a room is global. A ban is active while it has no expiry or
//! its expiry is still in the future.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{parse_db_time, to_db_time, DbPool};
use crate::{Result, TalkingError};

const BAN_COLUMNS: &str = "id, user_id, room_id, banned_by, reason, expires_at, created_at";

/// A persisted exclusion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ban {
    pub id: i64,
    pub user_id: i64,
    /// `None` for a global ban.
    pub room_id: Option<i64>,
    pub banned_by: Option<i64>,
    pub reason: String,
    /// `None` for a permanent ban.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ban {
    pub fn is_global(&self) -> bool {
        self.room_id.is_none()
    }

    /// An expiry equal to `now` is already past.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Pick the ban to report from a set of candidates.
///
/// Only active bans count. A room-scoped ban wins over a global one.
pub fn most_specific_active(bans: &[Ban], now: DateTime<Utc>) -> Option<&Ban> {
    let mut active = bans.iter().filter(|ban| ban.is_active_at(now));
    let first = active.next()?;
    if !first.is_global() {
        return Some(first);
    }
    Some(active.find(|ban| !ban.is_global()).unwrap_or(first))
}

#[derive(sqlx::FromRow)]
struct BanRow {
    id: i64,
    user_id: i64,
    room_id: Option<i64>,
    banned_by: Option<i64>,
    reason: String,
    expires_at: Option<String>,
    created_at: String,
}

impl From<BanRow> for Ban {
    fn from(row: BanRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            room_id: row.room_id,
            banned_by: row.banned_by,
            reason: row.reason,
            expires_at: row.expires_at.as_deref().and_then(parse_db_time),
            created_at: parse_db_time(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Data for issuing a ban.
#[derive(Debug, Clone)]
pub struct NewBan {
    pub user_id: i64,
    pub room_id: Option<i64>,
    pub banned_by: Option<i64>,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository for bans.
pub struct BanRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> BanRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Persist a ban.
    pub async fn create(&self, new_ban: &NewBan) -> Result<Ban> {
        let result = sqlx::query(
            "INSERT INTO bans (user_id, room_id, banned_by, reason, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new_ban.user_id)
        .bind(new_ban.room_id)
        .bind(new_ban.banned_by)
        .bind(&new_ban.reason)
        .bind(new_ban.expires_at.map(to_db_time))
        .bind(to_db_time(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| TalkingError::NotFound("ban".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Ban>> {
        let sql = format!("SELECT {BAN_COLUMNS} FROM bans WHERE id = ?");
        let row = sqlx::query_as::<_, BanRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(Ban::from))
    }

    /// Every ban, active or not, that could apply to the user in `room_id`:
    /// bans on that room plus global bans. Room-scoped bans come first.
    pub async fn find_applicable(&self, user_id: i64, room_id: Option<i64>) -> Result<Vec<Ban>> {
        let sql = format!(
            "SELECT {BAN_COLUMNS} FROM bans
             WHERE user_id = ? AND (room_id IS NULL OR room_id = ?)
             ORDER BY room_id IS NULL, id DESC"
        );
        let rows = sqlx::query_as::<_, BanRow>(&sql)
            .bind(user_id)
            .bind(room_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Ban::from).collect())
    }

    /// The active ban to report for the user in `room_id`, if any.
    pub async fn find_active(
        &self,
        user_id: i64,
        room_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>> {
        let bans = self.find_applicable(user_id, room_id).await?;
        Ok(most_specific_active(&bans, now).cloned())
    }

    /// All bans, newest first.
    pub async fn list_all(&self) -> Result<Vec<Ban>> {
        let sql = format!("SELECT {BAN_COLUMNS} FROM bans ORDER BY id DESC");
        let rows = sqlx::query_as::<_, BanRow>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Ban::from).collect())
    }

    /// Revoke a ban. Returns false if it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bans WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
