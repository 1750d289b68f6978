//! Exchange credentials for a token.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid};
use crate::AppState;

const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub email: String,
    pub name: String,
    pub verified_email: bool,
    /// `Bearer <jwt>`, ready for the `Authorization` header.
    pub token: String,
}

/// Handler to log in.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Envelope<Response>>> {
    let user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or(ServerError::NotFound("No account found with this email."))?;

    if !user.email_verified {
        return Err(ServerError::Precondition(
            "Please verify your account before logging in.",
        ));
    }

    state
        .passwords
        .verify_password(&body.password, &user.password)
        .map_err(|_| ServerError::Unauthorized("Invalid email or password."))?;

    let token = state.token.create(&user)?;

    tracing::debug!(user_id = %user.id, "user logged in");

    Ok(Envelope::with(
        "Logged in successfully.",
        Response {
            email: user.email,
            name: user.name,
            verified_email: user.email_verified,
            token: format!("{TOKEN_TYPE} {token}"),
        },
    ))
}
