//! Token verification.
//!
//! Tokens are issued elsewhere; the chat core only checks them.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{Result, TalkingError};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: i64,
    pub pseudo: String,
    /// Role at issue time. The stored role is authoritative.
    pub role: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
}

/// Verifies a bearer token and yields its claims.
pub trait AuthVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims>;
}

/// HS256 JWT verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier from the shared secret.
    pub fn new(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            decoding_key,
            validation,
        }
    }
}

impl AuthVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token.trim(), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    _ => "invalid token",
                };
                TalkingError::Authentication(message.to_string())
            })
    }
}
