//! Manage json web tokens.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::user::User;

/// Default token lifetime, in days.
pub const DEFAULT_EXPIRATION_DAYS: u64 = 30;
const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "verifiedEmail")]
    pub verified_email: bool,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
}

/// Manage JWT tokens, signed with HMAC-SHA256.
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(secret: &str, lifetime_days: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: lifetime_days * SECONDS_PER_DAY,
        }
    }

    /// Create a new token for a user.
    pub fn create(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            verified_email: user.email_verified,
            iat: now,
            exp: now + self.lifetime,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Decode a token and check its signature and expiration.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}
