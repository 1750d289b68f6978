//! Primary email verification.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid};
use crate::verification::{Purpose, Redeem};
use crate::AppState;

const NO_ACCOUNT: ServerError =
    ServerError::NotFound("No account found with this email.");

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct VerifyBody {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
    #[validate(range(
        min = 100_000,
        max = 999_999,
        message = "Code must be a 6 digit number."
    ))]
    pub otp: u32,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ResendBody {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
}

/// Consume the email verification code.
pub async fn verify(
    State(state): State<AppState>,
    Valid(body): Valid<VerifyBody>,
) -> Result<Json<Envelope<()>>> {
    let mut user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or(NO_ACCOUNT)?;

    state
        .verifier
        .redeem(&mut user, Redeem::EmailVerify, body.otp)
        .await?;

    Ok(Envelope::text("Your email has been verified, you can now log in."))
}

/// Send a new email verification code.
pub async fn resend(
    State(state): State<AppState>,
    Valid(body): Valid<ResendBody>,
) -> Result<Json<Envelope<()>>> {
    let mut user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or(NO_ACCOUNT)?;

    if user.email_verified {
        return Err(ServerError::Conflict("Your account is already verified."));
    }

    state.verifier.issue(&mut user, Purpose::EmailVerify).await?;

    Ok(Envelope::text("A new verification code has been sent to your email."))
}
