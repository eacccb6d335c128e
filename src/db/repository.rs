//! User repository for TALKING.
//!
//! Registration itself happens outside the chat core; `create` exists for
//! seeding and tests. Everything else here is what the chat core mutates:
//! roles and presence.

use chrono::{DateTime, Utc};

use super::user::{NewUser, Role, User, UserRow};
use super::{to_db_time, DbPool};
use crate::{Result, TalkingError};

const USER_COLUMNS: &str = "id, pseudo, birthdate, gender, role, verified, verification_badge,
                            online, last_seen, created_at";

/// Repository for user records.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user in the database.
    ///
    /// Returns the created user with the assigned ID.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let badge = new_user
            .role
            .is_elevated()
            .then(|| new_user.role.as_str().to_string());

        let result = sqlx::query(
            "INSERT INTO users (pseudo, birthdate, gender, role, verified, verification_badge, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_user.pseudo)
        .bind(new_user.birthdate.format("%Y-%m-%d").to_string())
        .bind(&new_user.gender)
        .bind(new_user.role.as_str())
        .bind(new_user.verified)
        .bind(badge)
        .bind(to_db_time(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| TalkingError::Database(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| TalkingError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// Get a user by pseudo (case-insensitive).
    pub async fn get_by_pseudo(&self, pseudo: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE pseudo = ? COLLATE NOCASE");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(pseudo)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// List users currently flagged online.
    pub async fn list_online(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE online = 1 ORDER BY pseudo");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Set the global role and align the verification badge with it.
    ///
    /// Returns false if no such user exists.
    pub async fn set_role(&self, id: i64, role: Role) -> Result<bool> {
        let badge = role.is_elevated().then(|| role.as_str());

        let result = sqlx::query("UPDATE users SET role = ?, verification_badge = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(badge)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the user online.
    pub async fn set_online(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET online = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(())
    }

    /// Mark the user offline and record when they were last seen.
    pub async fn set_offline(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET online = 0, last_seen = ? WHERE id = ?")
            .bind(to_db_time(at))
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(())
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await
            .map_err(|e| TalkingError::Database(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::NaiveDate;

    fn birthdate() -> NaiveDate {
        NaiveDate::from_ymd_opt(1995, 6, 20).unwrap()
    }

    #[tokio::test]
    async fn test_create_user() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo
            .create(&NewUser::new("alice", birthdate()).with_gender("female"))
            .await
            .unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.pseudo, "alice");
        assert_eq!(user.birthdate, birthdate());
        assert_eq!(user.gender, "female");
        assert_eq!(user.role, Role::User);
        assert!(!user.online);
        assert!(user.last_seen.is_none());
        assert!(user.verification_badge.is_none());
    }

    #[tokio::test]
    async fn test_create_elevated_user_gets_badge() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo
            .create(&NewUser::new("root", birthdate()).with_role(Role::Owner))
            .await
            .unwrap();

        assert_eq!(user.verification_badge.as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn test_duplicate_pseudo_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.create(&NewUser::new("alice", birthdate())).await.unwrap();
        let result = repo.create(&NewUser::new("ALICE", birthdate())).await;

        assert!(matches!(result, Err(TalkingError::Database(_))));
    }

    #[tokio::test]
    async fn test_get_by_pseudo_case_insensitive() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        repo.create(&NewUser::new("Alice", birthdate())).await.unwrap();

        let found = repo.get_by_pseudo("aLiCe").await.unwrap().unwrap();
        assert_eq!(found.pseudo, "Alice");
        assert!(repo.get_by_pseudo("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_id_missing() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        assert!(repo.get_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_role_updates_badge() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let user = repo.create(&NewUser::new("bob", birthdate())).await.unwrap();

        assert!(repo.set_role(user.id, Role::Op).await.unwrap());
        let bob = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(bob.role, Role::Op);
        assert_eq!(bob.verification_badge.as_deref(), Some("opp"));

        assert!(repo.set_role(user.id, Role::User).await.unwrap());
        let bob = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(bob.role, Role::User);
        assert!(bob.verification_badge.is_none());

        assert!(!repo.set_role(999, Role::Op).await.unwrap());
    }

    #[tokio::test]
    async fn test_presence_transitions() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let user = repo.create(&NewUser::new("carol", birthdate())).await.unwrap();

        repo.set_online(user.id).await.unwrap();
        let carol = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(carol.online);
        assert_eq!(repo.list_online().await.unwrap().len(), 1);

        let at = Utc::now();
        repo.set_offline(user.id, at).await.unwrap();
        let carol = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(!carol.online);
        assert_eq!(carol.last_seen.map(|t| t.timestamp()), Some(at.timestamp()));
        assert!(repo.list_online().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.create(&NewUser::new("a", birthdate())).await.unwrap();
        repo.create(&NewUser::new("b", birthdate())).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
