//! Mihu is the backend of a store builder: accounts with email verification,
//! password recovery, a two-factor recovery email, store headers, posts and
//! follows.

#![forbid(unsafe_code)]
mod clock;
mod crypto;
mod database;
pub mod error;
mod follow;
mod mail;
mod media;
mod middleware;
mod ports;
mod post;
mod router;
mod store;
pub mod telemetry;
mod token;
mod user;
mod verification;

#[cfg(test)]
mod memory;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::ports::{
    Clock, FollowRepository, MediaStore, Notifier, PostRepository,
    StoreRepository, UserRepository,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    content_type: &str,
    body: Vec<u8>,
) -> axum::response::Response {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, token);
    }

    app.oneshot(
        request
            .body(axum::body::Body::from(body))
            .expect("valid request"),
    )
    .await
    .expect("infallible router")
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: Arc<dyn UserRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub follows: Arc<dyn FollowRepository>,
    pub media: Arc<dyn MediaStore>,
    pub clock: Arc<dyn Clock>,
    pub passwords: Arc<crypto::PasswordManager>,
    pub token: Arc<token::TokenManager>,
    pub verifier: verification::Verifier,
    pub metrics: Option<PrometheusHandle>,
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .vary([header::AUTHORIZATION]);

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Micros)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        .layer(cors(&state.config.cors));

    let api = Router::new()
        .merge(router::posts::router(state.clone()))
        .merge(router::comments::router(state.clone()))
        .merge(router::likes::router(state.clone()))
        .merge(router::follows::router(state.clone()));

    Router::new()
        // `GET /` goes to `root`.
        .route("/", get(router::status::root))
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .nest("/api/auth", router::auth::router(state.clone()))
        .nest("/api/password", router::password::router(state.clone()))
        .nest("/api/2fa", router::two_factor::router(state.clone()))
        .nest("/api/header", router::header::router(state.clone()))
        .nest("/api", api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(media::MAX_UPLOAD_SIZE))
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file");
        return Err("missing `postgres` configuration".into());
    };
    let db = database::Database::new(postgres).await?;
    // execute migrations scripts on start.
    db.migrate().await?;

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| "missing `JWT_SECRET` environnement variable")?;
    let token = Arc::new(token::TokenManager::new(
        &secret,
        config
            .token
            .as_ref()
            .and_then(|token| token.expires_in_days)
            .unwrap_or(token::DEFAULT_EXPIRATION_DAYS),
    ));

    let passwords = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // handle mail sender.
    let notifier: Arc<dyn Notifier> = match &config.mail {
        Some(cfg) => Arc::new(mail::MailManager::new(cfg).await?),
        None => {
            tracing::warn!("missing `mail` entry, emails are only logged");
            Arc::new(mail::MailManager::default())
        },
    };

    let media: Arc<dyn MediaStore> = match &config.media {
        Some(cfg) => Arc::new(media::Cloudinary::new(cfg)?),
        None => {
            tracing::warn!("missing `media` entry, uploads are disabled");
            Arc::new(media::Unconfigured)
        },
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::error!(error = %err, "cannot install prometheus recorder");
            None
        },
    };

    let users: Arc<dyn UserRepository> =
        Arc::new(user::PgUserRepository::new(db.postgres.clone()));
    let clock: Arc<dyn Clock> = Arc::new(clock::SystemClock);
    let verifier = verification::Verifier::new(
        Arc::clone(&users),
        notifier,
        Arc::clone(&clock),
        Arc::new(crypto::OsCodeGenerator),
        Arc::clone(&passwords),
    );

    Ok(AppState {
        config,
        users,
        stores: Arc::new(store::PgStoreRepository::new(db.postgres.clone())),
        posts: Arc::new(post::PgPostRepository::new(db.postgres.clone())),
        follows: Arc::new(follow::PgFollowRepository::new(db.postgres)),
        media,
        clock,
        passwords,
        token,
        verifier,
        metrics,
    })
}
