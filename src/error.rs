//! Error types for TALKING.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::PermissionError;

/// Common error type for TALKING.
#[derive(Error, Debug)]
pub enum TalkingError {
    /// Token missing, invalid or expired, or the connection is not authenticated.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The acting role is not high enough for the operation.
    #[error("permission denied: {0}")]
    Authorization(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// An active ban blocks access.
    #[error("banned: {reason}")]
    Banned {
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Room is private.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// User age is outside the room's age range.
    #[error("age restricted: room is reserved for ages {}", format_age_range(.min_age, .max_age))]
    AgeRestricted {
        min_age: Option<u32>,
        max_age: Option<u32>,
    },

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

fn format_age_range(min_age: &Option<u32>, max_age: &Option<u32>) -> String {
    match (*min_age, *max_age) {
        (Some(min), Some(max)) => format!("{min}-{max}"),
        (Some(min), None) => format!("{min}+"),
        (None, Some(max)) => format!("up to {max}"),
        (None, None) => "any".to_string(),
    }
}

impl TalkingError {
    /// Short machine-readable code used in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            TalkingError::Authentication(_) => "authentication",
            TalkingError::Authorization(_) => "authorization",
            TalkingError::NotFound(_) => "not_found",
            TalkingError::Banned { .. } => "banned",
            TalkingError::AccessDenied(_) => "access_denied",
            TalkingError::AgeRestricted { .. } => "age_restricted",
            TalkingError::Validation(_) => "validation",
            TalkingError::Database(_) => "database",
            TalkingError::Io(_) => "io",
            TalkingError::Config(_) => "config",
        }
    }

    /// Whether this error refuses a room admission.
    pub fn is_access_denial(&self) -> bool {
        matches!(
            self,
            TalkingError::Banned { .. }
                | TalkingError::AccessDenied(_)
                | TalkingError::AgeRestricted { .. }
        )
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for TalkingError {
    fn from(e: sqlx::Error) -> Self {
        TalkingError::Database(e.to_string())
    }
}

impl From<PermissionError> for TalkingError {
    fn from(e: PermissionError) -> Self {
        TalkingError::Authorization(e.to_string())
    }
}

/// Result type alias for TALKING operations.
pub type Result<T> = std::result::Result<T, TalkingError>;
