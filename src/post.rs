//! Posts, their comments and likes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::ports::PostRepository;
use crate::user::Profile;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Comment joined with its author.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentDetails {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<Profile>,
}

/// Post joined with its author, comments and likes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<Profile>,
    pub comments: Vec<CommentDetails>,
    pub likes: Vec<Like>,
}

/// [`PostRepository`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgPostRepository {
    pool: Pool<Postgres>,
}

impl PgPostRepository {
    /// Create a new [`PgPostRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn create(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO posts (id, author_id, content, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(post.id)
        .bind(post.author_id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    async fn update(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"UPDATE posts SET content = $2, image_url = $3, updated_at = $4
            WHERE id = $1"#,
        )
        .bind(post.id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // comments and likes go through `ON DELETE CASCADE`.
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn create_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO comments (id, post_id, author_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        let comment =
            sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(comment)
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            "UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(comment.id)
        .bind(&comment.content)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE post_id = $1 ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn create_like(&self, like: &Like) -> Result<()> {
        sqlx::query(
            "INSERT INTO likes (user_id, post_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(like.user_id)
        .bind(like.post_id)
        .bind(like.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<Like>> {
        let like = sqlx::query_as::<_, Like>(
            "SELECT * FROM likes WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(like)
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn likes(&self, post_id: Uuid) -> Result<Vec<Like>> {
        let likes = sqlx::query_as::<_, Like>(
            "SELECT * FROM likes WHERE post_id = $1 ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(likes)
    }
}
