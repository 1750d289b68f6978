//! In-memory adapters, only compiled for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::Method;
use axum::response::Response;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;

use crate::config::{Argon2, Configuration};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::follow::Follow;
use crate::media::Upload;
use crate::ports::{
    Clock, CodeGenerator, FollowRepository, MediaStore, Notifier,
    PostRepository, StoreRepository, UserRepository,
};
use crate::post::{Comment, Like, Post};
use crate::store::Header;
use crate::token::TokenManager;
use crate::user::{Profile, User};
use crate::verification::{Purpose, Verifier};
use crate::{AppState, app};

/// Cheap Argon2 parameters.
pub fn password_manager() -> PasswordManager {
    PasswordManager::new(Some(Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .expect("valid argon2 parameters")
}

/// Clock frozen at a given instant, moved by hand.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Predictable codes: `start`, `start + 1`, ...
pub struct SequenceCodes {
    next: AtomicU32,
}

impl SequenceCodes {
    pub fn starting_at(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }
}

impl CodeGenerator for SequenceCodes {
    fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Notifier keeping every message.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl Outbox {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Sent> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Make every following `send` fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("transport is down")]
struct Down;

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::dependency("mail", Down));
        }

        self.sent.lock().unwrap().push(Sent {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

/// Media store returning fake URLs.
#[derive(Default)]
pub struct MemoryMedia {
    uploads: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryMedia {
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaStore for MemoryMedia {
    async fn upload(&self, file: Upload) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::dependency("media", Down));
        }

        let mut uploads = self.uploads.lock().unwrap();
        let url = format!(
            "https://media.test/{}/{}",
            uploads.len(),
            file.file_name
        );
        uploads.push(url.clone());
        Ok(url)
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUsers {
    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email == email)
            .cloned()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.by_email(email))
    }

    async fn find_by_two_factor_email(
        &self,
        email: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.two_factor.is_bound_to(email))
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|other| other.email == user.email) {
            return Err(ServerError::Conflict("email already registered"));
        }

        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        Self::save(&mut users, user)
    }

    async fn redeem(&self, user: &User, purpose: Purpose, code: u32) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        let stored = users
            .get(&user.id)
            .and_then(|stored| stored.codes.get(purpose))
            .map(|pending| pending.code);
        if stored != Some(code) {
            return Err(ServerError::InvalidCode);
        }

        Self::save(&mut users, user)
    }

    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        let users = self.users.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(User::profile))
            .collect())
    }
}

impl MemoryUsers {
    fn save(users: &mut HashMap<Uuid, User>, user: &User) -> Result<()> {
        if let Some(email) = &user.two_factor.email {
            if users
                .values()
                .any(|other| other.id != user.id && other.two_factor.is_bound_to(email))
            {
                return Err(ServerError::Conflict(
                    "two-factor email already bound",
                ));
            }
        }

        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            },
            None => Err(sqlx::Error::RowNotFound.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStores {
    headers: Mutex<HashMap<Uuid, Header>>,
}

#[async_trait]
impl StoreRepository for MemoryStores {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Header>> {
        Ok(self.headers.lock().unwrap().get(&user_id).cloned())
    }

    async fn create(&self, header: &Header) -> Result<()> {
        let mut headers = self.headers.lock().unwrap();
        if headers.contains_key(&header.user_id) {
            return Err(ServerError::Conflict("header already exists"));
        }

        headers.insert(header.user_id, header.clone());
        Ok(())
    }

    async fn update(&self, header: &Header) -> Result<()> {
        self.headers
            .lock()
            .unwrap()
            .insert(header.user_id, header.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPosts {
    posts: Mutex<Vec<Post>>,
    comments: Mutex<Vec<Comment>>,
    likes: Mutex<Vec<Like>>,
}

#[async_trait]
impl PostRepository for MemoryPosts {
    async fn create(&self, post: &Post) -> Result<()> {
        self.posts.lock().unwrap().push(post.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }

    async fn update(&self, post: &Post) -> Result<()> {
        let mut posts = self.posts.lock().unwrap();
        if let Some(stored) = posts.iter_mut().find(|p| p.id == post.id) {
            *stored = post.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.posts.lock().unwrap().retain(|post| post.id != id);
        self.comments.lock().unwrap().retain(|c| c.post_id != id);
        self.likes.lock().unwrap().retain(|like| like.post_id != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Post>> {
        let mut posts = self.posts.lock().unwrap().clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.comments.lock().unwrap().push(comment.clone());
        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|comment| comment.id == id)
            .cloned())
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        let mut comments = self.comments.lock().unwrap();
        if let Some(stored) = comments.iter_mut().find(|c| c.id == comment.id)
        {
            *stored = comment.clone();
        }
        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<()> {
        self.comments.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_like(&self, like: &Like) -> Result<()> {
        let mut likes = self.likes.lock().unwrap();
        if likes
            .iter()
            .any(|l| l.user_id == like.user_id && l.post_id == like.post_id)
        {
            return Err(ServerError::Conflict("already liked"));
        }

        likes.push(like.clone());
        Ok(())
    }

    async fn find_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<Like>> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.user_id == user_id && l.post_id == post_id)
            .cloned())
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<()> {
        self.likes
            .lock()
            .unwrap()
            .retain(|l| !(l.user_id == user_id && l.post_id == post_id));
        Ok(())
    }

    async fn likes(&self, post_id: Uuid) -> Result<Vec<Like>> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryFollows {
    follows: Mutex<Vec<Follow>>,
}

#[async_trait]
impl FollowRepository for MemoryFollows {
    async fn find(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .find(|f| {
                f.follower_id == follower_id && f.following_id == following_id
            })
            .cloned())
    }

    async fn create(&self, follow: &Follow) -> Result<()> {
        let mut follows = self.follows.lock().unwrap();
        if follows.iter().any(|f| {
            f.follower_id == follow.follower_id
                && f.following_id == follow.following_id
        }) {
            return Err(ServerError::Conflict("already following"));
        }

        follows.push(follow.clone());
        Ok(())
    }

    async fn delete(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<()> {
        self.follows.lock().unwrap().retain(|f| {
            !(f.follower_id == follower_id && f.following_id == following_id)
        });
        Ok(())
    }

    async fn followers(&self, user_id: Uuid) -> Result<Vec<Follow>> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.following_id == user_id)
            .cloned()
            .collect())
    }

    async fn following(&self, user_id: Uuid) -> Result<Vec<Follow>> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.follower_id == user_id)
            .cloned()
            .collect())
    }
}

/// First code handed out by [`context`].
pub const FIRST_CODE: u32 = 100_000;

/// Application state wired to in-memory adapters, with handles on them.
pub struct TestContext {
    pub state: AppState,
    pub users: Arc<MemoryUsers>,
    pub outbox: Arc<Outbox>,
    pub clock: Arc<FixedClock>,
    pub media: Arc<MemoryMedia>,
}

pub fn context() -> TestContext {
    let users = Arc::new(MemoryUsers::default());
    let outbox = Arc::new(Outbox::default());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let media = Arc::new(MemoryMedia::default());
    let passwords = Arc::new(password_manager());

    let verifier = Verifier::new(
        users.clone(),
        outbox.clone(),
        clock.clone(),
        Arc::new(SequenceCodes::starting_at(FIRST_CODE)),
        Arc::clone(&passwords),
    );

    let mut config = Configuration::default();
    config.name = "mihu".into();

    let state = AppState {
        config: Arc::new(config),
        users: users.clone(),
        stores: Arc::new(MemoryStores::default()),
        posts: Arc::new(MemoryPosts::default()),
        follows: Arc::new(MemoryFollows::default()),
        media: media.clone(),
        clock: clock.clone(),
        passwords,
        token: Arc::new(TokenManager::new("test-secret", 30)),
        verifier,
        metrics: None,
    };

    TestContext {
        state,
        users,
        outbox,
        clock,
        media,
    }
}

impl TestContext {
    /// Store an account with a known password, returns it with a bearer
    /// token.
    pub fn account(&self, name: &str, email: &str, verified: bool) -> (User, String) {
        let password = self
            .state
            .passwords
            .hash_password("password123")
            .expect("hashable password");
        let mut user = User::new(name.into(), email.into(), password, self.clock.now());
        user.email_verified = verified;
        self.users.insert(user.clone());

        let token = self.state.token.create(&user).expect("signed token");
        (user, format!("Bearer {token}"))
    }

    /// Send a JSON request to the whole router.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Response {
        crate::make_request(
            app(self.state.clone()),
            method,
            path,
            token,
            "application/json",
            body.to_string().into_bytes(),
        )
        .await
    }

    /// Send a multipart request. `file` is `(field, file name, bytes)`.
    pub async fn multipart(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> Response {
        const BOUNDARY: &str = "mihu-test-boundary";

        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((name, file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        crate::make_request(
            app(self.state.clone()),
            method,
            path,
            token,
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            body,
        )
        .await
    }
}

/// Read a JSON response body.
pub async fn json(response: Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
