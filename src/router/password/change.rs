//! Change the password knowing the current one.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid, ensure_verified};
use crate::user::User;

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 1, message = "Old password is required."))]
    pub old_password: String,
    #[validate(length(min = 6, message = "Password must contain at least 6 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match."))]
    pub confirm_password: String,
}

/// Handler to change the password.
pub async fn handler(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<Json<Envelope<()>>> {
    ensure_verified(&user, "Please verify your account first.")?;

    // compared on plaintext, no hash involved.
    if body.old_password == body.password {
        return Err(ServerError::Conflict(
            "New password must be different from the old one.",
        ));
    }

    state
        .passwords
        .verify_password(&body.old_password, &user.password)
        .map_err(|_| ServerError::Unauthorized("Old password is incorrect."))?;

    user.password = state.passwords.hash_password(&body.password)?;
    state.users.update(&user).await?;

    tracing::info!(user_id = %user.id, "password changed");

    Ok(Envelope::text("Your password has been changed."))
}
