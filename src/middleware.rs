//! Bearer token authentication.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::AppState;
use crate::error::{Result, ServerError};

const BEARER: &str = "Bearer ";
const UNAUTHORIZED: ServerError =
    ServerError::Unauthorized("Missing or invalid 'Authorization' header.");

/// Load the account owning the bearer token into request extensions.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(UNAUTHORIZED)?;

    let claims = state.token.decode(token).map_err(|_| UNAUTHORIZED)?;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| UNAUTHORIZED)?;
    let user = state.users.find_by_id(id).await?.ok_or(UNAUTHORIZED)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
