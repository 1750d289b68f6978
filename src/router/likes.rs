//! Likes on posts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router, middleware};
use uuid::Uuid;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::post::Like;
use crate::router::{Envelope, ensure_verified};
use crate::user::User;

const NO_POST: ServerError = ServerError::NotFound("Post not found.");

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/like", post(like).delete(unlike))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ))
}

async fn like(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Like>>)> {
    ensure_verified(&user, "Please verify your account to like posts.")?;

    if state.posts.find(post_id).await?.is_none() {
        return Err(NO_POST);
    }
    if state.posts.find_like(user.id, post_id).await?.is_some() {
        return Err(ServerError::Conflict("You already liked this post."));
    }

    let like = Like {
        user_id: user.id,
        post_id,
        created_at: state.clock.now(),
    };
    state.posts.create_like(&like).await?;

    Ok((StatusCode::CREATED, Envelope::with("Post liked.", like)))
}

async fn unlike(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Envelope<()>>> {
    if state.posts.find(post_id).await?.is_none() {
        return Err(NO_POST);
    }
    if state.posts.find_like(user.id, post_id).await?.is_none() {
        return Err(ServerError::NotFound("You have not liked this post."));
    }

    state.posts.delete_like(user.id, post_id).await?;

    Ok(Envelope::text("Post unliked."))
}
