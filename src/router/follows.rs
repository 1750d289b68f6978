//! Follow relations between accounts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use uuid::Uuid;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::follow::Follow;
use crate::router::{Envelope, ensure_verified};
use crate::user::{Profile, User};

const UNVERIFIED: &str = "Please verify your account to follow people.";
const NO_USER: ServerError = ServerError::NotFound("User not found.");

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/users/{id}/follow", post(follow).delete(unfollow))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ));

    Router::new()
        .route("/users/{id}/followers", get(followers))
        .route("/users/{id}/following", get(following))
        .merge(authenticated)
}

async fn follow(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Follow>>)> {
    ensure_verified(&user, UNVERIFIED)?;

    if id == user.id {
        return Err(ServerError::Precondition("You cannot follow yourself."));
    }
    if state.users.find_by_id(id).await?.is_none() {
        return Err(NO_USER);
    }
    if state.follows.find(user.id, id).await?.is_some() {
        return Err(ServerError::Conflict("You already follow this user."));
    }

    let follow = Follow {
        follower_id: user.id,
        following_id: id,
        created_at: state.clock.now(),
    };
    state.follows.create(&follow).await?;

    Ok((StatusCode::CREATED, Envelope::with("User followed.", follow)))
}

async fn unfollow(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>> {
    ensure_verified(&user, UNVERIFIED)?;

    if id == user.id {
        return Err(ServerError::Precondition("You cannot unfollow yourself."));
    }
    if state.follows.find(user.id, id).await?.is_none() {
        return Err(ServerError::NotFound("You do not follow this user."));
    }

    state.follows.delete(user.id, id).await?;

    Ok(Envelope::text("User unfollowed."))
}

async fn followers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<Profile>>>> {
    if state.users.find_by_id(id).await?.is_none() {
        return Err(NO_USER);
    }

    let ids: Vec<Uuid> = state
        .follows
        .followers(id)
        .await?
        .iter()
        .map(|follow| follow.follower_id)
        .collect();

    Ok(Envelope::with(
        "Followers fetched.",
        state.users.profiles(&ids).await?,
    ))
}

async fn following(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<Profile>>>> {
    if state.users.find_by_id(id).await?.is_none() {
        return Err(NO_USER);
    }

    let ids: Vec<Uuid> = state
        .follows
        .following(id)
        .await?
        .iter()
        .map(|follow| follow.following_id)
        .collect();

    Ok(Envelope::with(
        "Following fetched.",
        state.users.profiles(&ids).await?,
    ))
}
