//! Comments under posts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::post::{Comment, CommentDetails};
use crate::router::{Envelope, Valid, ensure_verified};
use crate::user::User;

const UNVERIFIED: &str = "Please verify your account to comment.";
const NO_POST: ServerError = ServerError::NotFound("Post not found.");
const NO_COMMENT: ServerError = ServerError::NotFound("Comment not found.");

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/posts/{id}/comments", post(create))
        .route("/comments/{id}", put(update).delete(remove))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ));

    Router::new()
        .route("/posts/{id}/comments", get(list))
        .merge(authenticated)
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Comment must be 1 to 500 characters long."
    ))]
    pub content: String,
}

/// Join comments with the profile of their authors.
pub async fn with_authors(
    state: &AppState,
    comments: Vec<Comment>,
) -> Result<Vec<CommentDetails>> {
    let mut ids: Vec<Uuid> =
        comments.iter().map(|comment| comment.author_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let profiles = state.users.profiles(&ids).await?;

    Ok(comments
        .into_iter()
        .map(|comment| CommentDetails {
            author: profiles
                .iter()
                .find(|profile| profile.id == comment.author_id)
                .cloned(),
            comment,
        })
        .collect())
}

async fn owned(state: &AppState, id: Uuid, user: &User) -> Result<Comment> {
    let comment = state.posts.find_comment(id).await?.ok_or(NO_COMMENT)?;

    if comment.author_id != user.id {
        return Err(ServerError::Forbidden(
            "You can only modify your own comments.",
        ));
    }

    Ok(comment)
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<Uuid>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Envelope<Comment>>)> {
    ensure_verified(&user, UNVERIFIED)?;

    if state.posts.find(post_id).await?.is_none() {
        return Err(NO_POST);
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        post_id,
        author_id: user.id,
        content: body.content,
        created_at: state.clock.now(),
        updated_at: None,
    };
    state.posts.create_comment(&comment).await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with("Comment added.", comment),
    ))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Valid(body): Valid<Body>,
) -> Result<Json<Envelope<Comment>>> {
    ensure_verified(&user, UNVERIFIED)?;
    let mut comment = owned(&state, id, &user).await?;

    comment.content = body.content;
    comment.updated_at = Some(state.clock.now());
    state.posts.update_comment(&comment).await?;

    Ok(Envelope::with("Comment updated.", comment))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>> {
    ensure_verified(&user, UNVERIFIED)?;
    let comment = owned(&state, id, &user).await?;

    state.posts.delete_comment(comment.id).await?;

    Ok(Envelope::text("Comment deleted."))
}

async fn list(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<CommentDetails>>>> {
    if state.posts.find(post_id).await?.is_none() {
        return Err(NO_POST);
    }

    let comments = with_authors(&state, state.posts.comments(post_id).await?).await?;

    Ok(Envelope::with("Comments fetched.", comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{self, TestContext, context};
    use crate::router::posts::tests::publish;
    use axum::http::Method;
    use serde_json::json;

    async fn comment(ctx: &TestContext, token: &str, post: Uuid, content: &str) -> Uuid {
        let response = ctx
            .request(
                Method::POST,
                &format!("/api/posts/{post}/comments"),
                Some(token),
                json!({ "content": content }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        memory::json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_comment_thread() {
        let ctx = context();
        let (_, jane) = ctx.account("Jane Smith", "jane@mihu.dev", true);
        let (john_user, john) = ctx.account("John Smith", "john@mihu.dev", true);
        let post = publish(&ctx, &jane, "Hello").await;

        comment(&ctx, &john, post, "Nice shop").await;
        comment(&ctx, &jane, post, "Thanks").await;

        let response = ctx
            .request(Method::GET, &format!("/api/posts/{post}/comments"), None, json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = memory::json(response).await;
        let comments = body["data"].as_array().unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["content"], "Nice shop");
        assert_eq!(comments[0]["author"]["id"], john_user.id.to_string());
        assert_eq!(comments[1]["author"]["name"], "Jane Smith");

        let response = ctx
            .request(Method::GET, &format!("/api/posts/{post}"), None, json!({}))
            .await;
        let body = memory::json(response).await;
        assert_eq!(body["data"]["comments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_comment_validation() {
        let ctx = context();
        let (_, token) = ctx.account("Jane Smith", "jane@mihu.dev", true);
        let post = publish(&ctx, &token, "Hello").await;

        let response = ctx
            .request(
                Method::POST,
                &format!("/api/posts/{post}/comments"),
                Some(&token),
                json!({ "content": "" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .request(
                Method::POST,
                &format!("/api/posts/{}/comments", Uuid::new_v4()),
                Some(&token),
                json!({ "content": "Hello" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_only_author_can_modify() {
        let ctx = context();
        let (_, jane) = ctx.account("Jane Smith", "jane@mihu.dev", true);
        let (_, john) = ctx.account("John Smith", "john@mihu.dev", true);
        let post = publish(&ctx, &jane, "Hello").await;
        let id = comment(&ctx, &john, post, "Nice shop").await;
        let path = format!("/api/comments/{id}");

        let response = ctx
            .request(Method::PUT, &path, Some(&jane), json!({ "content": "Edited" }))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx
            .request(Method::PUT, &path, Some(&john), json!({ "content": "Great shop" }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(memory::json(response).await["data"]["content"], "Great shop");

        let response = ctx.request(Method::DELETE, &path, Some(&jane), json!({})).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx.request(Method::DELETE, &path, Some(&john), json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = ctx.request(Method::DELETE, &path, Some(&john), json!({})).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
