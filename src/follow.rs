//! Follow relations between accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::ports::FollowRepository;

/// `follower_id` follows `following_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// [`FollowRepository`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgFollowRepository {
    pool: Pool<Postgres>,
}

impl PgFollowRepository {
    /// Create a new [`PgFollowRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowRepository for PgFollowRepository {
    async fn find(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(
            "SELECT * FROM followers WHERE follower_id = $1 AND following_id = $2",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    async fn create(&self, follow: &Follow) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO followers (follower_id, following_id, created_at)
            VALUES ($1, $2, $3)"#,
        )
        .bind(follow.follower_id)
        .bind(follow.following_id)
        .bind(follow.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM followers WHERE follower_id = $1 AND following_id = $2",
        )
        .bind(follower_id)
        .bind(following_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn followers(&self, user_id: Uuid) -> Result<Vec<Follow>> {
        let follows = sqlx::query_as::<_, Follow>(
            "SELECT * FROM followers WHERE following_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    async fn following(&self, user_id: Uuid) -> Result<Vec<Follow>> {
        let follows = sqlx::query_as::<_, Follow>(
            "SELECT * FROM followers WHERE follower_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }
}
