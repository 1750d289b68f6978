//! Outbound ports.
//!
//! Handlers only talk to storage, mail, media and time through these traits,
//! so adapters can be swapped (PostgreSQL in production, memory in tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::follow::Follow;
use crate::media::Upload;
use crate::post::{Comment, Like, Post};
use crate::store::Header;
use crate::user::{Profile, User};
use crate::verification::Purpose;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of six-digit one-time codes.
pub trait CodeGenerator: Send + Sync {
    fn next(&self) -> u32;
}

/// Delivers an already rendered message to an email address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Stores binary media and returns its public URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, file: Upload) -> Result<String>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_two_factor_email(
        &self,
        email: &str,
    ) -> Result<Option<User>>;
    /// Fails with a conflict if the email is already registered.
    async fn create(&self, user: &User) -> Result<()>;
    /// Saves every mutable field of the account.
    async fn update(&self, user: &User) -> Result<()>;
    /// Saves the account only if the stored `purpose` code is still `code`,
    /// otherwise fails with [`ServerError::InvalidCode`].
    ///
    /// [`ServerError::InvalidCode`]: crate::error::ServerError::InvalidCode
    async fn redeem(&self, user: &User, purpose: Purpose, code: u32)
    -> Result<()>;
    /// Public identity of several accounts at once.
    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>>;
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Header>>;
    async fn create(&self, header: &Header) -> Result<()>;
    async fn update(&self, header: &Header) -> Result<()>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<Post>>;
    async fn update(&self, post: &Post) -> Result<()>;
    /// Removes the post with its comments and likes.
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Every post, newest first.
    async fn list(&self) -> Result<Vec<Post>>;

    async fn create_comment(&self, comment: &Comment) -> Result<()>;
    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>>;
    async fn update_comment(&self, comment: &Comment) -> Result<()>;
    async fn delete_comment(&self, id: Uuid) -> Result<()>;
    /// Comments of a post, oldest first.
    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>>;

    /// Fails with a conflict if the user already liked the post.
    async fn create_like(&self, like: &Like) -> Result<()>;
    async fn find_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<Like>>;
    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<()>;
    async fn likes(&self, post_id: Uuid) -> Result<Vec<Like>>;
}

#[async_trait]
pub trait FollowRepository: Send + Sync {
    async fn find(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>>;
    /// Fails with a conflict if the relation already exists.
    async fn create(&self, follow: &Follow) -> Result<()>;
    async fn delete(&self, follower_id: Uuid, following_id: Uuid)
    -> Result<()>;
    /// Relations where `user_id` is followed.
    async fn followers(&self, user_id: Uuid) -> Result<Vec<Follow>>;
    /// Relations where `user_id` follows someone.
    async fn following(&self, user_id: Uuid) -> Result<Vec<Follow>>;
}
