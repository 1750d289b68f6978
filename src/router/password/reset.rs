//! Reset a forgotten password with a one-time code, sent either to the
//! primary email or to the two-factor email.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{Envelope, Valid};
use crate::user::User;
use crate::verification::{Purpose, Redeem};

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct RequestBody {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
}

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
    #[validate(range(
        min = 100_000,
        max = 999_999,
        message = "Code must be a 6 digit number."
    ))]
    pub otp: u32,
    #[validate(length(min = 6, message = "Password must contain at least 6 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match."))]
    pub confirm_password: String,
}

async fn by_email(state: &AppState, email: &str) -> Result<User> {
    state
        .users
        .find_by_email(email)
        .await?
        .ok_or(ServerError::NotFound("No account found with this email."))
}

/// Send a reset code to the primary email.
pub async fn request(
    State(state): State<AppState>,
    Valid(body): Valid<RequestBody>,
) -> Result<Json<Envelope<()>>> {
    let mut user = by_email(&state, &body.email).await?;
    state.verifier.issue(&mut user, Purpose::PasswordReset).await?;

    Ok(Envelope::text("A reset code has been sent to your email."))
}

/// Set a new password with the code sent to the primary email.
pub async fn reset(
    State(state): State<AppState>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<Envelope<()>>> {
    let mut user = by_email(&state, &body.email).await?;
    let redeem = Redeem::PasswordReset {
        password: body.password.clone(),
    };
    state.verifier.redeem(&mut user, redeem, body.otp).await?;

    Ok(Envelope::text("Your password has been reset."))
}

/// Send a reset code to the verified two-factor email.
pub async fn request_2fa(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
) -> Result<Json<Envelope<()>>> {
    state
        .verifier
        .issue(&mut user, Purpose::PasswordReset2FA)
        .await?;

    Ok(Envelope::text(
        "A reset code has been sent to your two-factor email.",
    ))
}

/// Set a new password with the code sent to the two-factor email.
pub async fn reset_2fa(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<Envelope<()>>> {
    Purpose::PasswordReset2FA.check(&user)?;

    if !user.two_factor.is_bound_to(&body.email) {
        return Err(ServerError::Unauthorized(
            "Email does not match your two-factor email.",
        ));
    }

    let redeem = Redeem::PasswordReset2FA {
        password: body.password.clone(),
    };
    state.verifier.redeem(&mut user, redeem, body.otp).await?;

    Ok(Envelope::text("Your password has been reset."))
}

#[cfg(test)]
mod tests {
    use crate::memory::{self, FIRST_CODE, TestContext, context};
    use crate::user::User;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn reset_body(email: &str, otp: u32) -> serde_json::Value {
        json!({
            "email": email,
            "otp": otp,
            "password": "password456",
            "confirmPassword": "password456",
        })
    }

    fn password_is(user: &User, password: &str) -> bool {
        memory::password_manager()
            .verify_password(password, &user.password)
            .is_ok()
    }

    #[tokio::test]
    async fn test_reset_through_primary_email() {
        let ctx = context();
        let (user, _) = ctx.account("Jane Smith", "jane@mihu.dev", true);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/request-reset-password",
                None,
                json!({ "email": "jane@mihu.dev" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let mail = ctx.outbox.last().unwrap();
        assert_eq!(mail.to, "jane@mihu.dev");
        assert_eq!(mail.subject, "Password Reset OTP");

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password",
                None,
                reset_body("jane@mihu.dev", FIRST_CODE + 7),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(password_is(&ctx.users.get(user.id).unwrap(), "password123"));

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password",
                None,
                reset_body("jane@mihu.dev", FIRST_CODE),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(password_is(&ctx.users.get(user.id).unwrap(), "password456"));
        assert_eq!(
            ctx.outbox.last().unwrap().subject,
            "Password Changed Successfully"
        );
    }

    #[tokio::test]
    async fn test_request_reissues_without_guard() {
        let ctx = context();
        ctx.account("Jane Smith", "jane@mihu.dev", true);

        for _ in 0..2 {
            let response = ctx
                .request(
                    Method::POST,
                    "/api/password/request-reset-password",
                    None,
                    json!({ "email": "jane@mihu.dev" }),
                )
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // first code was superseded.
        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password",
                None,
                reset_body("jane@mihu.dev", FIRST_CODE),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_request_unknown_or_unverified() {
        let ctx = context();
        ctx.account("Jane Smith", "jane@mihu.dev", false);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/request-reset-password",
                None,
                json!({ "email": "ghost@mihu.dev" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/request-reset-password",
                None,
                json!({ "email": "jane@mihu.dev" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ctx.outbox.sent().is_empty());
    }

    /// Account with a verified two-factor email.
    fn bound_account(ctx: &TestContext) -> (User, String) {
        let (mut user, token) =
            ctx.account("Jane Smith", "jane@mihu.dev", true);
        user.two_factor.enabled = true;
        user.two_factor.attach("backup@mihu.dev".into());
        user.two_factor.verified = true;
        ctx.users.insert(user.clone());
        (user, token)
    }

    #[tokio::test]
    async fn test_reset_through_two_factor_email() {
        let ctx = context();
        let (user, token) = bound_account(&ctx);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-request-password-2fa",
                Some(&token),
                json!({}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let mail = ctx.outbox.last().unwrap();
        assert_eq!(mail.to, "backup@mihu.dev");
        assert_eq!(mail.subject, "Reset Password");

        // the primary address is not the bound one.
        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password-2fa",
                Some(&token),
                reset_body("jane@mihu.dev", FIRST_CODE),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password-2fa",
                Some(&token),
                reset_body("backup@mihu.dev", FIRST_CODE),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(password_is(&ctx.users.get(user.id).unwrap(), "password456"));

        let mail = ctx.outbox.last().unwrap();
        assert_eq!(mail.to, "backup@mihu.dev");
        assert_eq!(mail.subject, "Your Primary Account Password Reset Success");
    }

    #[tokio::test]
    async fn test_two_factor_codes_do_not_reset_primary() {
        let ctx = context();
        let (_, token) = bound_account(&ctx);

        ctx.request(
            Method::POST,
            "/api/password/reset-request-password-2fa",
            Some(&token),
            json!({}),
        )
        .await;

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-password",
                None,
                reset_body("jane@mihu.dev", FIRST_CODE),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_request_2fa_without_binding() {
        let ctx = context();
        let (_, token) = ctx.account("Jane Smith", "jane@mihu.dev", true);

        let response = ctx
            .request(
                Method::POST,
                "/api/password/reset-request-password-2fa",
                Some(&token),
                json!({}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ctx.outbox.sent().is_empty());
    }
}
