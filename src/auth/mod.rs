//! Authentication and authorization for TALKING.
//!
//! Token verification for incoming connections and the role-based
//! permission rules used by moderation.

pub mod permission;
mod token;

pub use permission::{
    can_ban, can_kick, can_mute, can_set_role, check_permission, has_permission, PermissionError,
};
pub use token::{AuthVerifier, Claims, JwtVerifier};
