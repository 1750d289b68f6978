//! Two-factor email: a secondary address used to recover the account.

use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid};
use crate::user::{BindingState, User};
use crate::verification::{Purpose, Redeem};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/toggle", post(toggle))
        .route("/add-email", post(add_email))
        .route("/verify-email", post(verify_email))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Enable,
    Disable,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBody {
    pub action: Option<Action>,
    /// Takes precedence over `action`.
    pub force_disable: Option<bool>,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct AddEmailBody {
    #[serde(rename = "twoFAEmail")]
    #[validate(email(message = "Email must be formated."))]
    pub two_fa_email: String,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct VerifyEmailBody {
    #[serde(rename = "twoFAEmail")]
    #[validate(email(message = "Email must be formated."))]
    pub two_fa_email: String,
    #[validate(range(
        min = 100_000,
        max = 999_999,
        message = "Code must be a 6 digit number."
    ))]
    pub otp: u32,
}

/// Switch the feature on or off, or force-disable the bound email.
async fn toggle(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<ToggleBody>,
) -> Result<Json<Envelope<()>>> {
    let message = if body.force_disable == Some(true) {
        match user.two_factor.force_disable()? {
            BindingState::Added => {
                "Your unverified two-factor email has been disabled, verify it once two-factor authentication is enabled again."
            },
            _ => {
                "Your two-factor email has been disabled and will not be used for account recovery."
            },
        }
    } else {
        match body.action {
            Some(Action::Enable) => {
                user.two_factor.enable()?;
                "Two-factor authentication enabled."
            },
            Some(Action::Disable) => {
                user.two_factor.disable()?;
                "Two-factor authentication disabled."
            },
            None => {
                return Err(ServerError::invalid_field(
                    "action",
                    "Action must be either 'enable' or 'disable'.",
                ));
            },
        }
    };

    state.users.update(&user).await?;

    tracing::debug!(
        user_id = %user.id,
        enabled = user.two_factor.enabled,
        "two-factor settings changed"
    );

    Ok(Envelope::text(message))
}

/// Bind a two-factor email and send it a verification code.
async fn add_email(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<AddEmailBody>,
) -> Result<Json<Envelope<()>>> {
    user.two_factor
        .ensure_bindable(&user.email, &body.two_fa_email)?;

    if state
        .users
        .find_by_two_factor_email(&body.two_fa_email)
        .await?
        .is_some()
    {
        return Err(ServerError::Conflict(
            "This email is already used by another account, please use another one.",
        ));
    }

    user.two_factor.attach(body.two_fa_email);
    state
        .verifier
        .issue(&mut user, Purpose::TwoFactorEmailVerify)
        .await?;

    Ok(Envelope::text(
        "A verification code has been sent to your two-factor email.",
    ))
}

/// Prove ownership of the bound two-factor email.
async fn verify_email(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<VerifyEmailBody>,
) -> Result<Json<Envelope<()>>> {
    Purpose::TwoFactorEmailVerify.check(&user)?;

    if !user.two_factor.is_bound_to(&body.two_fa_email) {
        return Err(ServerError::Unauthorized(
            "Email does not match your two-factor email.",
        ));
    }

    state
        .verifier
        .redeem(&mut user, Redeem::TwoFactorEmailVerify, body.otp)
        .await?;

    Ok(Envelope::text("Your two-factor email has been verified."))
}
