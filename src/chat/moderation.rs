//! Moderation actions.
//!
//! Each action authorizes through the permission engine first, then writes
//! what needs to be persisted, then adjusts live sessions and announces.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::info;

use super::event::{Bot, BotMessageKind, ServerEvent};
use super::session::SessionGateway;
use crate::auth::permission::{require_ban, require_kick, require_set_role};
use crate::config::AutoRolePolicy;
use crate::db::{AutoRoleRepository, Ban, BanRepository, Database, NewBan, Role, Room, User, UserRepository};
use crate::{Result, TalkingError};

/// How long a ban lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDuration {
    Permanent,
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl BanDuration {
    /// Absolute expiry for a ban issued at `now`. `None` never expires.
    ///
    /// Fails when the expiry falls outside the representable date range.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let length = match *self {
            BanDuration::Permanent => return Ok(None),
            BanDuration::Minutes(n) => Duration::minutes(n as i64),
            BanDuration::Hours(n) => Duration::hours(n as i64),
            BanDuration::Days(n) => Duration::days(n as i64),
        };
        now.checked_add_signed(length)
            .map(Some)
            .ok_or_else(|| TalkingError::Validation(format!("duration too long: {self}")))
    }

    pub fn describe(&self) -> String {
        fn plural(n: u32, unit: &str) -> String {
            if n == 1 {
                format!("for 1 {unit}")
            } else {
                format!("for {n} {unit}s")
            }
        }

        match *self {
            BanDuration::Permanent => "permanently".to_string(),
            BanDuration::Minutes(n) => plural(n, "minute"),
            BanDuration::Hours(n) => plural(n, "hour"),
            BanDuration::Days(n) => plural(n, "day"),
        }
    }
}

impl FromStr for BanDuration {
    type Err = TalkingError;

    /// Accepts `<n>m`, `<n>h`, `<n>d`, `perm`, `permanent` or nothing.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s.is_empty() || s == "perm" || s == "permanent" {
            return Ok(BanDuration::Permanent);
        }

        let invalid = || TalkingError::Validation(format!("invalid duration: {s}"));
        let unit = s.chars().last().ok_or_else(invalid)?;
        let count: u32 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        match unit {
            'm' => Ok(BanDuration::Minutes(count)),
            'h' => Ok(BanDuration::Hours(count)),
            'd' => Ok(BanDuration::Days(count)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for BanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanDuration::Permanent => write!(f, "perm"),
            BanDuration::Minutes(n) => write!(f, "{n}m"),
            BanDuration::Hours(n) => write!(f, "{n}h"),
            BanDuration::Days(n) => write!(f, "{n}d"),
        }
    }
}

/// Performs kicks, bans and role changes.
pub struct ModerationExecutor {
    db: Database,
    sessions: Arc<SessionGateway>,
    policy: AutoRolePolicy,
    /// Room-scoped roles keyed by (user, room).
    overlays: RwLock<HashMap<(i64, i64), Role>>,
}

impl ModerationExecutor {
    pub fn new(db: Database, sessions: Arc<SessionGateway>, policy: AutoRolePolicy) -> Self {
        Self {
            db,
            sessions,
            policy,
            overlays: RwLock::new(HashMap::new()),
        }
    }

    /// The role that counts for `user` in `room`.
    ///
    /// A room overlay only ever raises the global role.
    pub async fn effective_role(&self, user: &User, room: Option<&Room>) -> Role {
        let Some(room) = room else {
            return user.role;
        };
        match self.overlays.read().await.get(&(user.id, room.id)) {
            Some(overlay) if *overlay > user.role => *overlay,
            _ => user.role,
        }
    }

    /// Ban `target` from `room`, or from the whole chat when `room` is `None`.
    ///
    /// A room ban counts room overlays; a global ban only global roles. The
    /// confirmation goes to `announce_in`, or privately to the moderator when
    /// there is no room to announce in.
    pub async fn ban(
        &self,
        moderator: &User,
        target: &User,
        room: Option<&Room>,
        reason: &str,
        duration: BanDuration,
        announce_in: Option<&Room>,
    ) -> Result<Ban> {
        let actor_role = self.effective_role(moderator, room).await;
        let target_role = self.effective_role(target, room).await;
        require_ban(actor_role, target_role)?;
        let expires_at = duration.expires_at(Utc::now())?;

        let ban = BanRepository::new(self.db.pool())
            .create(&NewBan {
                user_id: target.id,
                room_id: room.map(|r| r.id),
                banned_by: Some(moderator.id),
                reason: reason.to_string(),
                expires_at,
            })
            .await?;

        let scope = match room {
            Some(room) => {
                self.sessions
                    .evict(target.id, room, reason, &moderator.pseudo)
                    .await;
                format!("from {}", room.name)
            }
            None => {
                self.sessions.terminate(target.id, reason).await;
                "from the chat".to_string()
            }
        };
        info!(
            "{} banned {} {} {} ({})",
            moderator.pseudo,
            target.pseudo,
            scope,
            duration.describe(),
            reason
        );

        let announcement = ServerEvent::bot(
            Bot::Drise,
            BotMessageKind::Warning,
            format!(
                "{} has been banned {} {} by {}: {}",
                target.pseudo,
                scope,
                duration.describe(),
                moderator.pseudo,
                reason
            ),
        );
        self.announce(moderator, announce_in.or(room), announcement).await;

        Ok(ban)
    }

    /// Remove `target` from `room` without recording anything.
    pub async fn kick(&self, moderator: &User, target: &User, room: &Room, reason: &str) -> Result<()> {
        let actor_role = self.effective_role(moderator, Some(room)).await;
        let target_role = self.effective_role(target, Some(room)).await;
        require_kick(actor_role, target_role)?;

        self.sessions
            .evict(target.id, room, reason, &moderator.pseudo)
            .await;
        info!("{} kicked {} from {} ({})", moderator.pseudo, target.pseudo, room.name, reason);

        let announcement = ServerEvent::bot(
            Bot::Drise,
            BotMessageKind::Warning,
            format!("{} was kicked by {}: {}", target.pseudo, moderator.pseudo, reason),
        );
        self.sessions.broadcast_room(room.id, announcement).await;
        Ok(())
    }

    /// Change `target`'s global role.
    ///
    /// Room overlays do not count here, the change applies everywhere.
    pub async fn grant_role(&self, moderator: &User, target: &User, role: Role, room: Option<&Room>) -> Result<()> {
        require_set_role(moderator.role, target.role, role)?;

        let updated = UserRepository::new(self.db.pool())
            .set_role(target.id, role)
            .await?;
        if !updated {
            return Err(TalkingError::NotFound(format!("user {}", target.pseudo)));
        }
        info!("{} set role of {} to {}", moderator.pseudo, target.pseudo, role.as_str());

        let announcement = ServerEvent::bot(
            Bot::Drise,
            BotMessageKind::Success,
            format!("{} is now {}", target.pseudo, role.with_article()),
        );
        self.announce(moderator, room, announcement).await;
        Ok(())
    }

    /// Apply the auto role stored for (user, room), if any.
    ///
    /// Returns the role that took effect, or `None` when nothing changed.
    pub async fn apply_auto_role(&self, user: &User, room: &Room) -> Result<Option<Role>> {
        let Some(auto_role) = AutoRoleRepository::new(self.db.pool())
            .find(user.id, room.id)
            .await?
        else {
            return Ok(None);
        };
        let role = auto_role.role;

        match self.policy {
            AutoRolePolicy::Global => {
                if user.role == role {
                    return Ok(None);
                }
                UserRepository::new(self.db.pool())
                    .set_role(user.id, role)
                    .await?;
            }
            AutoRolePolicy::Room => {
                let previous = self
                    .overlays
                    .write()
                    .await
                    .insert((user.id, room.id), role);
                if previous == Some(role) {
                    return Ok(None);
                }
            }
        }
        info!("Auto role {} applied to {} in {}", role.as_str(), user.pseudo, room.name);

        self.sessions
            .broadcast_room(
                room.id,
                ServerEvent::bot(
                    Bot::Drise,
                    BotMessageKind::Success,
                    format!("{} is now {}", user.pseudo, role.with_article()),
                ),
            )
            .await;
        Ok(Some(role))
    }

    async fn announce(&self, moderator: &User, room: Option<&Room>, event: ServerEvent) {
        match room {
            Some(room) => {
                self.sessions.broadcast_room(room.id, event).await;
            }
            None => {
                self.sessions.send_to_user(moderator.id, event).await;
            }
        }
    }
}
