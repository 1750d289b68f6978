//! Create an account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid};
use crate::user::User;
use crate::AppState;

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(
        min = 6,
        max = 40,
        message = "Name must be 6 to 40 characters long."
    ))]
    pub name: String,
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must contain at least 6 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match."))]
    pub confirm_password: String,
}

/// Handler to create an account.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Envelope<()>>)> {
    if state.users.find_by_email(&body.email).await?.is_some() {
        return Err(ServerError::Conflict(
            "An account already exists with this email, please use another one.",
        ));
    }

    let password = state.passwords.hash_password(&body.password)?;
    let user = User::new(
        body.name.clone(),
        body.email.clone(),
        password,
        state.clock.now(),
    );
    state.verifier.enroll(user).await?;

    Ok((
        StatusCode::CREATED,
        Envelope::text(
            "Account created, a verification code has been sent to your email.",
        ),
    ))
}
