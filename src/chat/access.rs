//! Room admission.
//!
//! Stages run in a fixed order and the first match decides: ban, then
//! privacy, then age.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{most_specific_active, Ban, BanRepository, DbPool, Role, Room, User};
use crate::{Result, TalkingError};

/// Why a user may not enter a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Banned {
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    },
    Private,
    AgeRestricted {
        min_age: Option<u32>,
        max_age: Option<u32>,
    },
}

impl DenyReason {
    pub fn into_error(self) -> TalkingError {
        match self {
            DenyReason::Banned { reason, expires_at } => TalkingError::Banned { reason, expires_at },
            DenyReason::Private => TalkingError::AccessDenied("this room is private".to_string()),
            DenyReason::AgeRestricted { min_age, max_age } => {
                TalkingError::AgeRestricted { min_age, max_age }
            }
        }
    }

    /// Text shown to the refused user.
    pub fn message(&self) -> String {
        match self {
            DenyReason::Banned {
                reason,
                expires_at: Some(at),
            } => format!(
                "You are banned until {}: {}",
                at.format("%Y-%m-%d %H:%M UTC"),
                reason
            ),
            DenyReason::Banned { reason, .. } => format!("You are banned: {reason}"),
            other => other.clone().into_error().to_string(),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Decide admission from already loaded bans.
///
/// `bans` may hold room-scoped and global bans for the user; inactive ones
/// are ignored. Only the baseline role is subject to privacy and age rules.
pub fn evaluate(user: &User, room: &Room, bans: &[Ban], now: DateTime<Utc>) -> Admission {
    let relevant: Vec<Ban> = bans
        .iter()
        .filter(|ban| ban.user_id == user.id)
        .filter(|ban| ban.room_id.map_or(true, |id| id == room.id))
        .cloned()
        .collect();
    if let Some(ban) = most_specific_active(&relevant, now) {
        return Admission::Denied(DenyReason::Banned {
            reason: ban.reason.clone(),
            expires_at: ban.expires_at,
        });
    }

    if room.is_private && user.role == Role::User {
        return Admission::Denied(DenyReason::Private);
    }

    if room.is_age_restricted && user.role == Role::User {
        let age = user.age_on(now.date_naive());
        if !room.admits_age(age) {
            return Admission::Denied(DenyReason::AgeRestricted {
                min_age: room.min_age,
                max_age: room.max_age,
            });
        }
    }

    Admission::Allowed
}

/// Admission checks backed by the ban table.
pub struct RoomAccessController<'a> {
    pool: &'a DbPool,
}

impl<'a> RoomAccessController<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn can_join(&self, user: &User, room: &Room) -> Result<Admission> {
        let bans = BanRepository::new(self.pool)
            .find_applicable(user.id, Some(room.id))
            .await?;
        let admission = evaluate(user, room, &bans, Utc::now());
        if let Admission::Denied(reason) = &admission {
            info!("{} refused from {}: {:?}", user.pseudo, room.name, reason);
        }
        Ok(admission)
    }

    /// Like [`can_join`](Self::can_join), with a denial turned into an error.
    pub async fn check(&self, user: &User, room: &Room) -> Result<()> {
        match self.can_join(user, room).await? {
            Admission::Allowed => Ok(()),
            Admission::Denied(reason) => Err(reason.into_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewBan, NewRoom, NewUser, RoomRepository, UserRepository};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn user(role: Role, birthdate: NaiveDate) -> User {
        User {
            id: 1,
            pseudo: "alice".to_string(),
            birthdate,
            gender: "female".to_string(),
            role,
            verified: false,
            verification_badge: None,
            online: true,
            last_seen: None,
            created_at: Utc::now(),
        }
    }

    fn room(private: bool, min_age: Option<u32>, max_age: Option<u32>) -> Room {
        Room {
            id: 10,
            name: "teens".to_string(),
            topic: String::new(),
            is_private: private,
            is_age_restricted: min_age.is_some() || max_age.is_some(),
            min_age,
            max_age,
            password: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn ban(room_id: Option<i64>, reason: &str, expires_at: Option<DateTime<Utc>>) -> Ban {
        Ban {
            id: 0,
            user_id: 1,
            room_id,
            banned_by: None,
            reason: reason.to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn born(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_room_allows() {
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(false, None, None), &[], at(2024, 1, 1));
        assert!(admission.is_allowed());
    }

    #[test]
    fn test_active_ban_denies() {
        let now = at(2024, 6, 1);
        let bans = [ban(Some(10), "spam", Some(now + Duration::hours(1)))];
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(false, None, None), &bans, now);
        assert_eq!(
            admission,
            Admission::Denied(DenyReason::Banned {
                reason: "spam".to_string(),
                expires_at: Some(now + Duration::hours(1)),
            })
        );
    }

    #[test]
    fn test_expired_ban_does_not_deny() {
        let now = at(2024, 6, 1);
        let bans = [ban(None, "old", Some(now - Duration::minutes(1))), ban(Some(10), "edge", Some(now))];
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(false, None, None), &bans, now);
        assert!(admission.is_allowed());
    }

    #[test]
    fn test_room_ban_reported_over_global() {
        let now = at(2024, 6, 1);
        let bans = [ban(None, "global", None), ban(Some(10), "room", None)];
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(false, None, None), &bans, now);
        assert!(matches!(admission, Admission::Denied(DenyReason::Banned { reason, .. }) if reason == "room"));
    }

    #[test]
    fn test_ban_for_other_room_ignored() {
        let now = at(2024, 6, 1);
        let bans = [ban(Some(99), "elsewhere", None)];
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(false, None, None), &bans, now);
        assert!(admission.is_allowed());
    }

    #[test]
    fn test_ban_applies_to_elevated_roles() {
        let now = at(2024, 6, 1);
        let bans = [ban(None, "global", None)];
        let admission = evaluate(&user(Role::Admin, born(2000, 1, 1)), &room(false, None, None), &bans, now);
        assert!(!admission.is_allowed());
    }

    #[test]
    fn test_private_room_denies_baseline_only() {
        let private = room(true, None, None);
        let now = at(2024, 6, 1);
        assert_eq!(
            evaluate(&user(Role::User, born(2000, 1, 1)), &private, &[], now),
            Admission::Denied(DenyReason::Private)
        );
        assert!(evaluate(&user(Role::Voice, born(2000, 1, 1)), &private, &[], now).is_allowed());
    }

    #[test]
    fn test_age_boundaries() {
        let teens = room(false, Some(13), Some(17));
        let now = at(2024, 6, 15);

        // 13 today.
        assert!(evaluate(&user(Role::User, born(2011, 6, 15)), &teens, &[], now).is_allowed());
        // 13 tomorrow.
        assert!(!evaluate(&user(Role::User, born(2011, 6, 16)), &teens, &[], now).is_allowed());
        // Still 17, turns 18 tomorrow.
        assert!(evaluate(&user(Role::User, born(2006, 6, 16)), &teens, &[], now).is_allowed());
        // 18 today.
        assert_eq!(
            evaluate(&user(Role::User, born(2006, 6, 15)), &teens, &[], now),
            Admission::Denied(DenyReason::AgeRestricted {
                min_age: Some(13),
                max_age: Some(17),
            })
        );
    }

    #[test]
    fn test_age_restriction_bypassed_by_elevated_role() {
        let teens = room(false, Some(13), Some(17));
        let admission = evaluate(&user(Role::Voice, born(1980, 1, 1)), &teens, &[], at(2024, 6, 15));
        assert!(admission.is_allowed());
    }

    #[test]
    fn test_open_bound() {
        let adults = room(false, Some(18), None);
        let now = at(2024, 6, 15);
        assert!(evaluate(&user(Role::User, born(1930, 1, 1)), &adults, &[], now).is_allowed());
        assert!(!evaluate(&user(Role::User, born(2010, 1, 1)), &adults, &[], now).is_allowed());
    }

    #[test]
    fn test_ban_checked_before_privacy() {
        let now = at(2024, 6, 1);
        let bans = [ban(None, "global", None)];
        let admission = evaluate(&user(Role::User, born(2000, 1, 1)), &room(true, None, None), &bans, now);
        assert!(matches!(admission, Admission::Denied(DenyReason::Banned { .. })));
    }

    #[test]
    fn test_deny_messages() {
        assert_eq!(DenyReason::Banned { reason: "spam".to_string(), expires_at: None }.message(), "You are banned: spam");
        assert_eq!(
            DenyReason::AgeRestricted { min_age: Some(13), max_age: Some(17) }.message(),
            "age restricted: room is reserved for ages 13-17"
        );
        assert!(DenyReason::Private.into_error().is_access_denial());
    }

    #[tokio::test]
    async fn test_controller_uses_stored_bans() {
        let db = Database::open_in_memory().await.unwrap();
        let alice = UserRepository::new(db.pool())
            .create(&NewUser::new("alice", born(1990, 1, 1)))
            .await
            .unwrap();
        let general = RoomRepository::new(db.pool())
            .create(&NewRoom::new("general", ""))
            .await
            .unwrap();
        let controller = RoomAccessController::new(db.pool());

        assert!(controller.can_join(&alice, &general).await.unwrap().is_allowed());
        controller.check(&alice, &general).await.unwrap();

        BanRepository::new(db.pool())
            .create(&NewBan {
                user_id: alice.id,
                room_id: Some(general.id),
                banned_by: None,
                reason: "flood".to_string(),
                expires_at: None,
            })
            .await
            .unwrap();

        let result = controller.check(&alice, &general).await;
        assert!(matches!(result, Err(TalkingError::Banned { reason, .. }) if reason == "flood"));
    }
}
