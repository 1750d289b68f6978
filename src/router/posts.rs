//! Posts with an image.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::post::{Post, PostDetails};
use crate::router::comments::with_authors;
use crate::router::{Envelope, Form, ensure_verified, image};
use crate::user::User;

const IMAGE_FIELD: &str = "postImage";
const UNVERIFIED: &str = "Please verify your account to publish.";
const NO_POST: ServerError = ServerError::NotFound("Post not found.");

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/posts", post(create))
        .route("/posts/{id}", put(update).delete(remove))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ));

    Router::new()
        .route("/posts", get(list))
        .route("/posts/{id}", get(details))
        .merge(authenticated)
}

/// Text fields of the post form.
#[derive(Debug, Validate)]
struct PostForm {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Content must be 1 to 500 characters long."
    ))]
    content: Option<String>,
}

impl PostForm {
    fn read(form: &mut Form) -> Result<Self> {
        let fields = PostForm {
            content: form.fields.remove("content"),
        };
        fields.validate()?;
        Ok(fields)
    }
}

/// Load a post owned by `user`.
async fn owned(state: &AppState, id: Uuid, user: &User) -> Result<Post> {
    let post = state.posts.find(id).await?.ok_or(NO_POST)?;

    if post.author_id != user.id {
        return Err(ServerError::Forbidden(
            "You can only modify your own posts.",
        ));
    }

    Ok(post)
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<Post>>)> {
    ensure_verified(&user, UNVERIFIED)?;

    let mut form = Form::read(multipart, IMAGE_FIELD).await?;
    let content = PostForm::read(&mut form)?.content.ok_or_else(|| {
        ServerError::invalid_field("content", "Content is required.")
    })?;
    let file = image(form.file, IMAGE_FIELD)?;

    let post = Post {
        id: Uuid::new_v4(),
        author_id: user.id,
        content,
        image_url: state.media.upload(file).await?,
        created_at: state.clock.now(),
        updated_at: None,
    };
    state.posts.create(&post).await?;

    tracing::debug!(post_id = %post.id, author_id = %user.id, "post created");

    Ok((StatusCode::CREATED, Envelope::with("Post created.", post)))
}

/// Replace the content, the image, or both.
async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<Envelope<Post>>> {
    ensure_verified(&user, UNVERIFIED)?;
    let mut post = owned(&state, id, &user).await?;

    let mut form = Form::read(multipart, IMAGE_FIELD).await?;
    if let Some(content) = PostForm::read(&mut form)?.content {
        post.content = content;
    }
    if form.file.is_some() {
        let file = image(form.file, IMAGE_FIELD)?;
        post.image_url = state.media.upload(file).await?;
    }

    post.updated_at = Some(state.clock.now());
    state.posts.update(&post).await?;

    Ok(Envelope::with("Post updated.", post))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>> {
    ensure_verified(&user, UNVERIFIED)?;
    let post = owned(&state, id, &user).await?;

    state.posts.delete(post.id).await?;

    Ok(Envelope::text("Post deleted."))
}

/// Post with its author, comments and likes.
async fn details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<PostDetails>>> {
    let post = state.posts.find(id).await?.ok_or(NO_POST)?;

    let author = state
        .users
        .profiles(&[post.author_id])
        .await?
        .into_iter()
        .next();
    let comments = with_authors(&state, state.posts.comments(id).await?).await?;
    let likes = state.posts.likes(id).await?;

    Ok(Envelope::with(
        "Post fetched.",
        PostDetails {
            post,
            author,
            comments,
            likes,
        },
    ))
}

/// Every post, newest first.
async fn list(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Post>>>> {
    let posts = state.posts.list().await?;

    if posts.is_empty() {
        return Err(ServerError::NotFound("No posts found."));
    }

    Ok(Envelope::with("Posts fetched.", posts))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::{self, TestContext, context};
    use axum::http::Method;
    use chrono::TimeDelta;
    use serde_json::json;

    /// Publish a post as the owner of `token`, returns its id.
    pub(crate) async fn publish(ctx: &TestContext, token: &str, content: &str) -> Uuid {
        let response = ctx
            .multipart(
                Method::POST,
                "/api/posts",
                Some(token),
                &[("content", content)],
                Some((IMAGE_FIELD, "photo.png", b"png".as_slice())),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = memory::json(response).await;
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_post() {
        let ctx = context();
        let (user, token) = ctx.account("Jane Smith", "jane@mihu.dev", true);

        let id = publish(&ctx, &token, "First drop of the season").await;

        let response = ctx
            .request(Method::GET, &format!("/api/posts/{id}"), None, json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = memory::json(response).await;
        assert_eq!(body["data"]["content"], "First drop of the season");
        assert_eq!(body["data"]["imageUrl"], "https://media.test/0/photo.png");
        assert_eq!(body["data"]["author"]["name"], "Jane Smith");
        assert_eq!(body["data"]["authorId"], user.id.to_string());
        assert_eq!(body["data"]["comments"], json!([]));
    }

    #[tokio::test]
    async fn test_create_invalid_post() {
        let ctx = context();
        let (_, token) = ctx.account("Jane Smith", "jane@mihu.dev", true);

        let response = ctx
            .multipart(
                Method::POST,
                "/api/posts",
                Some(&token),
                &[("content", "No image")],
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let long = "a".repeat(501);
        let response = ctx
            .multipart(
                Method::POST,
                "/api/posts",
                Some(&token),
                &[("content", long.as_str())],
                Some((IMAGE_FIELD, "photo.png", b"png".as_slice())),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ctx.media.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_create_unverified() {
        let ctx = context();
        let (_, token) = ctx.account("Jane Smith", "jane@mihu.dev", false);

        let response = ctx
            .multipart(
                Method::POST,
                "/api/posts",
                Some(&token),
                &[("content", "Hello")],
                Some((IMAGE_FIELD, "photo.png", b"png".as_slice())),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_only_author_can_modify() {
        let ctx = context();
        let (_, jane) = ctx.account("Jane Smith", "jane@mihu.dev", true);
        let (_, john) = ctx.account("John Smith", "john@mihu.dev", true);
        let id = publish(&ctx, &jane, "Hello").await;
        let path = format!("/api/posts/{id}");

        let response = ctx
            .multipart(Method::PUT, &path, Some(&john), &[("content", "Hacked")], None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx.request(Method::DELETE, &path, Some(&john), json!({})).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx
            .multipart(Method::PUT, &path, Some(&jane), &[("content", "Hello again")], None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = memory::json(response).await;
        assert_eq!(body["data"]["content"], "Hello again");
        assert_eq!(body["data"]["imageUrl"], "https://media.test/0/photo.png");

        let response = ctx.request(Method::DELETE, &path, Some(&jane), json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = ctx.request(Method::GET, &path, None, json!({})).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_posts() {
        let ctx = context();
        let response = ctx.request(Method::GET, "/api/posts", None, json!({})).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let (_, token) = ctx.account("Jane Smith", "jane@mihu.dev", true);
        publish(&ctx, &token, "older").await;
        ctx.clock.advance(TimeDelta::minutes(1));
        publish(&ctx, &token, "newer").await;

        let response = ctx.request(Method::GET, "/api/posts", None, json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = memory::json(response).await;
        let contents: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| post["content"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(contents, ["newer", "older"]);
    }

    #[tokio::test]
    async fn test_unknown_post() {
        let ctx = context();
        let response = ctx
            .request(
                Method::GET,
                &format!("/api/posts/{}", Uuid::new_v4()),
                None,
                json!({}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
