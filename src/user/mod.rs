mod repository;
mod two_factor;

pub use repository::*;
pub use two_factor::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::verification::PendingCodes;

/// Account as saved on database.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password: String,
    pub email_verified: bool,
    pub codes: PendingCodes,
    pub two_factor: TwoFactorEmail,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh, unverified account.
    pub fn new(
        name: String,
        email: String,
        password: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password,
            email_verified: false,
            codes: PendingCodes::default(),
            two_factor: TwoFactorEmail::default(),
            created_at: now,
        }
    }

    /// Public identity of the account.
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// What other users can see about an account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
}
