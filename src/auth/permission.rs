//! Permission checking for TALKING.
//!
//! Pure functions over the role order. Every moderation decision in the chat
//! goes through here; nothing else compares ranks.

use thiserror::Error;

use crate::db::Role;

/// Permission-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Actor is below the required role.
    #[error("this requires the {0} role or higher")]
    InsufficientRole(String),

    #[error("you cannot kick this user")]
    CannotKick,

    #[error("you cannot mute this user")]
    CannotMute,

    #[error("you cannot ban this user")]
    CannotBan,

    /// The role itself is out of the actor's reach.
    #[error("you cannot grant the {0} role")]
    CannotGrantRole(String),

    /// The target already ranks at or above the actor.
    #[error("you cannot change the role of someone ranked at or above you")]
    TargetOutranks,
}

/// Whether `actor` is at least `required`. Reflexive and monotonic.
///
/// # Examples
///
/// ```
/// use talking::auth::permission::has_permission;
/// use talking::db::Role;
///
/// assert!(has_permission(Role::Op, Role::HalfOp));
/// assert!(has_permission(Role::Op, Role::Op));
/// assert!(!has_permission(Role::Voice, Role::HalfOp));
/// ```
pub fn has_permission(actor: Role, required: Role) -> bool {
    actor.rank() >= required.rank()
}

/// Half-operators and above may kick anyone strictly below them.
pub fn can_kick(actor: Role, target: Role) -> bool {
    has_permission(actor, Role::HalfOp) && actor.rank() > target.rank()
}

/// Same rule as [`can_kick`].
pub fn can_mute(actor: Role, target: Role) -> bool {
    has_permission(actor, Role::HalfOp) && actor.rank() > target.rank()
}

/// Operators and above may ban anyone strictly below them.
pub fn can_ban(actor: Role, target: Role) -> bool {
    has_permission(actor, Role::Op) && actor.rank() > target.rank()
}

/// Whether `actor` may hand out `role`.
///
/// Only an owner can make another owner. Every other role can only be given
/// by someone ranked strictly above it.
///
/// # Examples
///
/// ```
/// use talking::auth::permission::can_set_role;
/// use talking::db::Role;
///
/// assert!(can_set_role(Role::Owner, Role::Owner));
/// assert!(!can_set_role(Role::Admin, Role::Owner));
/// assert!(can_set_role(Role::Admin, Role::Op));
/// assert!(!can_set_role(Role::Op, Role::Op));
/// ```
pub fn can_set_role(actor: Role, role: Role) -> bool {
    if role == Role::Owner {
        return actor == Role::Owner;
    }
    actor.rank() > role.rank()
}

/// Require at least `required`.
pub fn check_permission(actor: Role, required: Role) -> Result<(), PermissionError> {
    if !has_permission(actor, required) {
        return Err(PermissionError::InsufficientRole(
            required.display_name().to_string(),
        ));
    }
    Ok(())
}

pub fn require_kick(actor: Role, target: Role) -> Result<(), PermissionError> {
    if !can_kick(actor, target) {
        return Err(PermissionError::CannotKick);
    }
    Ok(())
}

pub fn require_mute(actor: Role, target: Role) -> Result<(), PermissionError> {
    if !can_mute(actor, target) {
        return Err(PermissionError::CannotMute);
    }
    Ok(())
}

pub fn require_ban(actor: Role, target: Role) -> Result<(), PermissionError> {
    if !can_ban(actor, target) {
        return Err(PermissionError::CannotBan);
    }
    Ok(())
}

/// Full check for changing a user's role.
///
/// Besides [`can_set_role`], the actor must strictly outrank the target's
/// current role. This keeps peers and superiors from being demoted and rules
/// out acting on oneself.
pub fn require_set_role(actor: Role, target_current: Role, role: Role) -> Result<(), PermissionError> {
    if !can_set_role(actor, role) {
        return Err(PermissionError::CannotGrantRole(role.display_name().to_string()));
    }
    if actor.rank() <= target_current.rank() {
        return Err(PermissionError::TargetOutranks);
    }
    Ok(())
}
