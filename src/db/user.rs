//! User model for TALKING.
//!
//! Defines the User record and the Role hierarchy used for every
//! permission decision.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User role, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Role {
    /// Baseline participant.
    #[default]
    #[serde(rename = "user")]
    User = 0,
    /// May speak in moderated rooms.
    #[serde(rename = "voice")]
    Voice = 1,
    /// Junior moderator, may kick.
    #[serde(rename = "half-opp")]
    HalfOp = 2,
    /// Operator, may ban.
    #[serde(rename = "opp")]
    Op = 3,
    /// Administrator.
    #[serde(rename = "admin")]
    Admin = 4,
    /// Top role.
    #[serde(rename = "owner")]
    Owner = 5,
}

impl Role {
    /// Every role in ascending order.
    pub const ALL: [Role; 6] = [
        Role::User,
        Role::Voice,
        Role::HalfOp,
        Role::Op,
        Role::Admin,
        Role::Owner,
    ];

    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Voice => "voice",
            Role::HalfOp => "half-opp",
            Role::Op => "opp",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Human readable name used in announcements.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Voice => "voice",
            Role::HalfOp => "half-operator",
            Role::Op => "operator",
            Role::Admin => "administrator",
            Role::Owner => "owner",
        }
    }

    /// Display name with its indefinite article ("an operator").
    pub fn with_article(&self) -> String {
        let name = self.display_name();
        let article = match name.chars().next() {
            // Not "u": "a user".
            Some('a' | 'e' | 'i' | 'o') => "an",
            _ => "a",
        };
        format!("{article} {name}")
    }

    /// IRC-style nick prefix shown in join announcements.
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::User => "",
            Role::Voice => "+",
            Role::HalfOp => "@",
            Role::Op => "%",
            Role::Admin => "&",
            Role::Owner => "~",
        }
    }

    /// Badge icon drawn next to verified names.
    pub fn badge_icon(&self) -> Option<&'static str> {
        match self {
            Role::User => None,
            Role::Voice => Some("🔵"),
            Role::HalfOp => Some("🟡"),
            Role::Op => Some("🔴"),
            Role::Admin => Some("🟠"),
            Role::Owner => Some("🟢"),
        }
    }

    /// Numeric rank, 0 for the baseline role.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Anything above the baseline role.
    pub fn is_elevated(&self) -> bool {
        *self > Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "voice" => Ok(Role::Voice),
            "half-opp" | "halfop" | "half-op" => Ok(Role::HalfOp),
            "opp" | "op" | "operator" => Ok(Role::Op),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// A chat participant.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    /// Unique display name.
    pub pseudo: String,
    pub birthdate: NaiveDate,
    /// Used by clients for name styling only.
    pub gender: String,
    pub role: Role,
    pub verified: bool,
    pub verification_badge: Option<String>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Check if this user has at least the required role level.
    pub fn has_role(&self, required: Role) -> bool {
        self.role >= required
    }

    /// Age in whole years on the given day.
    ///
    /// A birthday not yet reached in `today`'s year does not count.
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let mut age = today.year() - self.birthdate.year();
        if (today.month(), today.day()) < (self.birthdate.month(), self.birthdate.day()) {
            age -= 1;
        }
        age
    }
}

/// Database row type for User.
#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: i64,
    pseudo: String,
    birthdate: String,
    gender: String,
    role: String,
    verified: bool,
    verification_badge: Option<String>,
    online: bool,
    last_seen: Option<String>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            pseudo: row.pseudo,
            birthdate: NaiveDate::parse_from_str(&row.birthdate, "%Y-%m-%d").unwrap_or_default(),
            gender: row.gender,
            role: row.role.parse().unwrap_or_default(),
            verified: row.verified,
            verification_badge: row.verification_badge,
            online: row.online,
            last_seen: row.last_seen.as_deref().and_then(super::parse_db_time),
            created_at: super::parse_db_time(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Data for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub pseudo: String,
    pub birthdate: NaiveDate,
    pub gender: String,
    pub role: Role,
    pub verified: bool,
}

impl NewUser {
    /// Create a baseline, unverified user.
    pub fn new(pseudo: impl Into<String>, birthdate: NaiveDate) -> Self {
        Self {
            pseudo: pseudo.into(),
            birthdate,
            gender: "other".to_string(),
            role: Role::User,
            verified: false,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the gender.
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = gender.into();
        self
    }

    /// Mark the user verified.
    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_born(y: i32, m: u32, d: u32) -> User {
        User {
            id: 1,
            pseudo: "alice".to_string(),
            birthdate: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            gender: "female".to_string(),
            role: Role::User,
            verified: false,
            verification_badge: None,
            online: false,
            last_seen: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_ordering() {
        for pair in Role::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert_eq!(Role::User.rank(), 0);
        assert_eq!(Role::Owner.rank(), 5);
    }

    #[test]
    fn test_role_as_str_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_role_from_str_aliases() {
        assert_eq!("OP".parse::<Role>().unwrap(), Role::Op);
        assert_eq!("halfop".parse::<Role>().unwrap(), Role::HalfOp);
        assert_eq!("operator".parse::<Role>().unwrap(), Role::Op);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_default() {
        assert_eq!(Role::default(), Role::User);
        assert!(!Role::User.is_elevated());
        assert!(Role::Voice.is_elevated());
    }

    #[test]
    fn test_role_prefix_and_badge() {
        assert_eq!(Role::Owner.prefix(), "~");
        assert_eq!(Role::Admin.prefix(), "&");
        assert_eq!(Role::Op.prefix(), "%");
        assert_eq!(Role::HalfOp.prefix(), "@");
        assert_eq!(Role::Voice.prefix(), "+");
        assert_eq!(Role::User.prefix(), "");
        assert_eq!(Role::User.badge_icon(), None);
        assert_eq!(Role::Owner.badge_icon(), Some("🟢"));
    }

    #[test]
    fn test_role_with_article() {
        assert_eq!(Role::Op.with_article(), "an operator");
        assert_eq!(Role::Admin.with_article(), "an administrator");
        assert_eq!(Role::Voice.with_article(), "a voice");
        assert_eq!(Role::HalfOp.with_article(), "a half-operator");
        assert_eq!(Role::User.with_article(), "a user");
        assert_eq!(Role::Owner.with_article(), "an owner");
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::HalfOp).unwrap(), "\"half-opp\"");
        let role: Role = serde_json::from_str("\"opp\"").unwrap();
        assert_eq!(role, Role::Op);
    }

    #[test]
    fn test_age_on_birthday_reached() {
        let user = user_born(2008, 3, 15);
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(user.age_on(today), 16);
    }

    #[test]
    fn test_age_on_birthday_not_reached() {
        let user = user_born(2008, 3, 15);
        assert_eq!(user.age_on(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()), 15);
        assert_eq!(user.age_on(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()), 15);
    }

    #[test]
    fn test_age_on_leap_day_birthdate() {
        let user = user_born(2004, 2, 29);
        assert_eq!(user.age_on(NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()), 18);
        assert_eq!(user.age_on(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()), 19);
    }

    #[test]
    fn test_has_role() {
        let mut user = user_born(2000, 1, 1);
        assert!(user.has_role(Role::User));
        assert!(!user.has_role(Role::Voice));
        user.role = Role::Admin;
        assert!(user.has_role(Role::Op));
    }

    #[test]
    fn test_new_user_builder() {
        let new_user = NewUser::new("bob", NaiveDate::from_ymd_opt(1999, 5, 5).unwrap())
            .with_role(Role::Voice)
            .with_gender("male")
            .verified();

        assert_eq!(new_user.pseudo, "bob");
        assert_eq!(new_user.role, Role::Voice);
        assert_eq!(new_user.gender, "male");
        assert!(new_user.verified);
    }
}
