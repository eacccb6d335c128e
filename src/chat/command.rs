//! Bot command parser and dispatcher for TALKING.
//!
//! Any text starting with the command prefix is a command. The first word
//! after the prefix names it, case-insensitively; unknown names are
//! swallowed without reaching the room.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::access::{Admission, RoomAccessController};
use super::event::{Bot, BotMessageKind, ServerEvent};
use super::moderation::{BanDuration, ModerationExecutor};
use super::session::SessionGateway;
use crate::auth::permission::{require_ban, require_kick, require_set_role};
use crate::config::{ChatConfig, ModerationConfig};
use crate::db::{Database, Role, Room, User, UserRepository};
use crate::{Result, TalkingError};

/// Groups shown in the help listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Utility,
    Fun,
    Moderation,
}

impl CommandCategory {
    pub fn title(&self) -> &'static str {
        match self {
            CommandCategory::Utility => "Utility",
            CommandCategory::Fun => "Fun",
            CommandCategory::Moderation => "Moderation",
        }
    }
}

/// Bot command information for help display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    /// Command name.
    pub name: &'static str,
    /// Command aliases.
    pub aliases: &'static [&'static str],
    /// Arguments, without the prefix and name.
    pub syntax: &'static str,
    /// Command description.
    pub description: &'static str,
    pub category: CommandCategory,
}

/// Every registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Seen,
    Whois,
    Kiss,
    Hug,
    Slap,
    Kick,
    Ban,
    GlobalBan,
    Voice,
    HalfOp,
    Op,
    Admin,
    Owner,
    Deop,
}

impl CommandKind {
    const ALL: [CommandKind; 15] = [
        CommandKind::Help,
        CommandKind::Seen,
        CommandKind::Whois,
        CommandKind::Kiss,
        CommandKind::Hug,
        CommandKind::Slap,
        CommandKind::Kick,
        CommandKind::Ban,
        CommandKind::GlobalBan,
        CommandKind::Voice,
        CommandKind::HalfOp,
        CommandKind::Op,
        CommandKind::Admin,
        CommandKind::Owner,
        CommandKind::Deop,
    ];

    pub fn all() -> &'static [CommandKind] {
        &Self::ALL
    }

    pub fn info(&self) -> CommandInfo {
        use CommandCategory::*;

        let (name, aliases, syntax, description, category): (_, &'static [&'static str], _, _, _) =
            match self {
                CommandKind::Help => ("help", &["h", "?"], "", "Show this list", Utility),
                CommandKind::Seen => ("seen", &[], "<pseudo>", "When someone was last online", Utility),
                CommandKind::Whois => ("whois", &["who"], "<pseudo>", "Show someone's profile", Utility),
                CommandKind::Kiss => ("kiss", &[], "<pseudo>", "Send someone a kiss", Fun),
                CommandKind::Hug => ("hug", &[], "<pseudo>", "Give someone a hug", Fun),
                CommandKind::Slap => ("slap", &[], "<pseudo>", "Slap someone, gently", Fun),
                CommandKind::Kick => ("kick", &[], "<pseudo> [reason]", "Remove someone from this room", Moderation),
                CommandKind::Ban => (
                    "ban",
                    &[],
                    "<pseudo> [duration] [reason]",
                    "Ban someone from this room (30m, 2h, 7d or perm)",
                    Moderation,
                ),
                CommandKind::GlobalBan => (
                    "gban",
                    &["globalban"],
                    "<pseudo> [duration] [reason]",
                    "Ban someone from the whole chat",
                    Moderation,
                ),
                CommandKind::Voice => ("voice", &[], "<pseudo>", "Give someone voice", Moderation),
                CommandKind::HalfOp => ("halfop", &["hop"], "<pseudo>", "Make someone a half-operator", Moderation),
                CommandKind::Op => ("op", &[], "<pseudo>", "Make someone an operator", Moderation),
                CommandKind::Admin => ("admin", &[], "<pseudo>", "Make someone an administrator", Moderation),
                CommandKind::Owner => ("owner", &[], "<pseudo>", "Make someone an owner", Moderation),
                CommandKind::Deop => ("deop", &[], "<pseudo>", "Take someone's role away", Moderation),
            };

        CommandInfo {
            name,
            aliases,
            syntax,
            description,
            category,
        }
    }

    /// Look a command up by name or alias.
    pub fn from_token(token: &str) -> Option<CommandKind> {
        let token = token.to_lowercase();
        Self::ALL.into_iter().find(|kind| {
            let info = kind.info();
            info.name == token || info.aliases.contains(&token.as_str())
        })
    }

    /// Role handed out by a role command.
    pub fn granted_role(&self) -> Option<Role> {
        match self {
            CommandKind::Voice => Some(Role::Voice),
            CommandKind::HalfOp => Some(Role::HalfOp),
            CommandKind::Op => Some(Role::Op),
            CommandKind::Admin => Some(Role::Admin),
            CommandKind::Owner => Some(Role::Owner),
            CommandKind::Deop => Some(Role::User),
            _ => None,
        }
    }

    fn fun_verb(&self) -> Option<&'static str> {
        match self {
            CommandKind::Kiss => Some("kisses"),
            CommandKind::Hug => Some("hugs"),
            CommandKind::Slap => Some("slaps"),
            _ => None,
        }
    }

    fn usage(&self, prefix: &str) -> String {
        let info = self.info();
        if info.syntax.is_empty() {
            format!("Usage: {}{}", prefix, info.name)
        } else {
            format!("Usage: {}{} {}", prefix, info.name, info.syntax)
        }
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Known { kind: CommandKind, args: Vec<String> },
    Unknown(String),
}

/// Parse `text` as a command. Returns `None` when it lacks the prefix.
pub fn parse_command(text: &str, prefix: &str) -> Option<BotCommand> {
    let rest = text.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let token = words.next().unwrap_or_default();
    let args = words.map(str::to_string).collect();

    Some(match CommandKind::from_token(token) {
        Some(kind) => BotCommand::Known { kind, args },
        None => BotCommand::Unknown(token.to_lowercase()),
    })
}

/// Whether a ban argument is meant as a duration rather than the start of
/// a reason: `perm`, `permanent`, or digits followed by a single letter.
fn looks_like_duration(word: &str) -> bool {
    if word.eq_ignore_ascii_case("perm") || word.eq_ignore_ascii_case("permanent") {
        return true;
    }
    let mut chars = word.chars();
    let Some(unit) = chars.next_back() else {
        return false;
    };
    let digits = chars.as_str();
    unit.is_ascii_alphabetic() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Format the help listing.
pub fn format_help(prefix: &str) -> String {
    let mut lines = vec!["Available commands:".to_string()];

    for category in [
        CommandCategory::Utility,
        CommandCategory::Fun,
        CommandCategory::Moderation,
    ] {
        lines.push(String::new());
        lines.push(format!("{}:", category.title()));
        for kind in CommandKind::all() {
            let info = kind.info();
            if info.category != category {
                continue;
            }
            let mut line = format!("  {}{}", prefix, info.name);
            if !info.syntax.is_empty() {
                line.push(' ');
                line.push_str(info.syntax);
            }
            line.push_str(&format!(" - {}", info.description));
            if !info.aliases.is_empty() {
                let separator = format!(", {prefix}");
                line.push_str(&format!(" (also {prefix}{})", info.aliases.join(separator.as_str())));
            }
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Format the answer to `!seen`.
pub fn format_seen(user: &User, live: bool, now: DateTime<Utc>) -> String {
    if live {
        return format!("{} is currently online", user.pseudo);
    }
    let Some(last_seen) = user.last_seen else {
        return format!("{} has never been seen", user.pseudo);
    };

    let elapsed = now.signed_duration_since(last_seen);
    let minutes = elapsed.num_minutes().max(0);
    let hours = elapsed.num_hours();
    if minutes < 2 {
        format!("{} was last seen just now", user.pseudo)
    } else if hours < 1 {
        format!("{} was last seen {} minutes ago", user.pseudo, minutes)
    } else if hours < 24 {
        let unit = if hours == 1 { "hour" } else { "hours" };
        format!("{} was last seen {} {} ago", user.pseudo, hours, unit)
    } else {
        format!("{} was last seen on {}", user.pseudo, last_seen.format("%Y-%m-%d"))
    }
}

/// Format the answer to `!whois`.
pub fn format_whois(user: &User, live: bool, now: DateTime<Utc>) -> String {
    format!(
        "{}{} | role: {} | verified: {} | {} | age: {}",
        user.role.prefix(),
        user.pseudo,
        user.role.display_name(),
        if user.verified { "yes" } else { "no" },
        if live { "online" } else { "offline" },
        user.age_on(now.date_naive())
    )
}

/// Executes bot commands on behalf of a user.
pub struct CommandDispatcher {
    db: Database,
    sessions: Arc<SessionGateway>,
    moderation: Arc<ModerationExecutor>,
    prefix: String,
    default_kick_reason: String,
    default_ban_reason: String,
}

impl CommandDispatcher {
    pub fn new(
        db: Database,
        sessions: Arc<SessionGateway>,
        moderation: Arc<ModerationExecutor>,
        chat: &ChatConfig,
        config: &ModerationConfig,
    ) -> Self {
        Self {
            db,
            sessions,
            moderation,
            prefix: chat.command_prefix.clone(),
            default_kick_reason: config.default_kick_reason.clone(),
            default_ban_reason: config.default_ban_reason.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run `raw` as a command.
    ///
    /// Returns false only when `raw` lacks the prefix. Refusals and usage
    /// mistakes are answered privately and count as handled.
    pub async fn dispatch(&self, raw: &str, actor: &User, room: Option<&Room>) -> Result<bool> {
        let Some(command) = parse_command(raw, &self.prefix) else {
            return Ok(false);
        };

        match command {
            BotCommand::Unknown(name) => {
                debug!("{} used unknown command {:?}", actor.pseudo, name);
            }
            BotCommand::Known { kind, args } => {
                self.invoke(kind, &args, actor, room).await?;
            }
        }
        Ok(true)
    }

    async fn invoke(&self, kind: CommandKind, args: &[String], actor: &User, room: Option<&Room>) -> Result<()> {
        match kind {
            CommandKind::Help => {
                self.reply(actor, Bot::Nay, BotMessageKind::Help, format_help(&self.prefix))
                    .await;
                Ok(())
            }
            CommandKind::Seen | CommandKind::Whois => self.lookup(kind, args, actor).await,
            CommandKind::Kiss | CommandKind::Hug | CommandKind::Slap => {
                self.fun(kind, args, actor, room).await
            }
            CommandKind::Kick | CommandKind::Ban | CommandKind::GlobalBan => {
                self.moderate(kind, args, actor, room).await
            }
            CommandKind::Voice
            | CommandKind::HalfOp
            | CommandKind::Op
            | CommandKind::Admin
            | CommandKind::Owner
            | CommandKind::Deop => self.set_role(kind, args, actor, room).await,
        }
    }

    async fn lookup(&self, kind: CommandKind, args: &[String], actor: &User) -> Result<()> {
        let Some(pseudo) = args.first() else {
            self.usage(actor, Bot::View, kind).await;
            return Ok(());
        };

        let Some(target) = UserRepository::new(self.db.pool()).get_by_pseudo(pseudo).await? else {
            self.not_found(actor, Bot::View, pseudo).await;
            return Ok(());
        };

        let live = self.sessions.is_online(target.id).await;
        let now = Utc::now();
        let text = match kind {
            CommandKind::Whois => format_whois(&target, live, now),
            _ => format_seen(&target, live, now),
        };
        self.reply(actor, Bot::View, BotMessageKind::Info, text).await;
        Ok(())
    }

    async fn fun(&self, kind: CommandKind, args: &[String], actor: &User, room: Option<&Room>) -> Result<()> {
        let (Some(target), Some(room), Some(verb)) = (args.first(), room, kind.fun_verb()) else {
            self.usage(actor, Bot::Nay, kind).await;
            return Ok(());
        };

        if let Admission::Denied(reason) = RoomAccessController::new(self.db.pool())
            .can_join(actor, room)
            .await?
        {
            self.reply(actor, Bot::Nay, BotMessageKind::Warning, reason.message())
                .await;
            return Ok(());
        }

        self.sessions
            .broadcast_room(
                room.id,
                ServerEvent::bot(
                    Bot::Nay,
                    BotMessageKind::Fun,
                    format!("{} {} {}", actor.pseudo, verb, target),
                ),
            )
            .await;
        Ok(())
    }

    async fn moderate(&self, kind: CommandKind, args: &[String], actor: &User, room: Option<&Room>) -> Result<()> {
        let Some(pseudo) = args.first() else {
            self.usage(actor, Bot::Drise, kind).await;
            return Ok(());
        };
        let scoped_room = match (kind, room) {
            (CommandKind::GlobalBan, _) => None,
            (_, Some(room)) => Some(room),
            (_, None) => {
                self.reply(
                    actor,
                    Bot::Drise,
                    BotMessageKind::Warning,
                    format!("{}{} only works inside a room", self.prefix, kind.info().name),
                )
                .await;
                return Ok(());
            }
        };

        let Some(target) = UserRepository::new(self.db.pool()).get_by_pseudo(pseudo).await? else {
            self.not_found(actor, Bot::Drise, pseudo).await;
            return Ok(());
        };

        // Room overlays only count for actions scoped to that room.
        let actor_role = self.moderation.effective_role(actor, scoped_room).await;
        let target_role = self.moderation.effective_role(&target, scoped_room).await;
        let allowed = match kind {
            CommandKind::Kick => require_kick(actor_role, target_role),
            _ => require_ban(actor_role, target_role),
        };
        if let Err(e) = allowed {
            self.refuse(actor, e.into()).await;
            return Ok(());
        }

        let rest = &args[1..];
        let result = match (kind, scoped_room) {
            (CommandKind::Kick, Some(room)) => {
                let reason = self.reason_or(rest, &self.default_kick_reason);
                self.moderation.kick(actor, &target, room, &reason).await
            }
            _ => {
                let (duration, rest) = match rest.first() {
                    Some(word) if looks_like_duration(word) => match word.parse::<BanDuration>() {
                        Ok(duration) => (duration, &rest[1..]),
                        Err(e) => {
                            self.invalid(actor, kind, e).await;
                            return Ok(());
                        }
                    },
                    _ => (BanDuration::Permanent, rest),
                };
                let reason = self.reason_or(rest, &self.default_ban_reason);
                self.moderation
                    .ban(actor, &target, scoped_room, &reason, duration, room)
                    .await
                    .map(|_| ())
            }
        };

        self.settle(actor, kind, result).await
    }

    async fn set_role(&self, kind: CommandKind, args: &[String], actor: &User, room: Option<&Room>) -> Result<()> {
        let (Some(pseudo), Some(role)) = (args.first(), kind.granted_role()) else {
            self.usage(actor, Bot::Drise, kind).await;
            return Ok(());
        };

        let Some(target) = UserRepository::new(self.db.pool()).get_by_pseudo(pseudo).await? else {
            self.not_found(actor, Bot::Drise, pseudo).await;
            return Ok(());
        };

        if let Err(e) = require_set_role(actor.role, target.role, role) {
            self.refuse(actor, e.into()).await;
            return Ok(());
        }

        let result = self.moderation.grant_role(actor, &target, role, room).await;
        self.settle(actor, kind, result).await
    }

    /// Report authorization and input failures privately, pass anything
    /// else on.
    async fn settle(&self, actor: &User, kind: CommandKind, result: Result<()>) -> Result<()> {
        match result {
            Err(e @ TalkingError::Authorization(_)) => {
                self.refuse(actor, e).await;
                Ok(())
            }
            Err(e @ TalkingError::Validation(_)) => {
                self.invalid(actor, kind, e).await;
                Ok(())
            }
            other => other,
        }
    }

    fn reason_or(&self, words: &[String], default: &str) -> String {
        if words.is_empty() {
            default.to_string()
        } else {
            words.join(" ")
        }
    }

    async fn refuse(&self, actor: &User, error: TalkingError) {
        self.reply(actor, Bot::Drise, BotMessageKind::Warning, error.to_string())
            .await;
    }

    async fn usage(&self, actor: &User, bot: Bot, kind: CommandKind) {
        self.reply(actor, bot, BotMessageKind::Warning, kind.usage(&self.prefix))
            .await;
    }

    async fn invalid(&self, actor: &User, kind: CommandKind, error: TalkingError) {
        let text = format!("{}. {}", error, kind.usage(&self.prefix));
        self.reply(actor, Bot::Drise, BotMessageKind::Warning, text)
            .await;
    }

    async fn not_found(&self, actor: &User, bot: Bot, pseudo: &str) {
        self.reply(actor, bot, BotMessageKind::Error, format!("User {pseudo} not found"))
            .await;
    }

    async fn reply(&self, actor: &User, bot: Bot, kind: BotMessageKind, text: String) {
        self.sessions
            .send_to_user(actor.id, ServerEvent::bot(bot, kind, text))
            .await;
    }
}
