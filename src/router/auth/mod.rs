//! Registration, email verification and login.
pub mod login;
pub mod register;
pub mod verify;

use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Envelope;
use crate::AppState;
use crate::user::User;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /api/auth/register` goes to `register`.
        .route("/register", post(register::handler))
        .route("/verify-email", post(verify::verify))
        .route("/resend-otp", post(verify::resend))
        .route("/login", post(login::handler))
        // `GET /api/auth/user`. Authorization required.
        .route(
            "/user",
            get(me).route_layer(middleware::from_fn_with_state(
                state,
                crate::middleware::auth,
            )),
        )
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
}

/// Return the authenticated account.
async fn me(Extension(user): Extension<User>) -> Json<Envelope<Me>> {
    Envelope::with(
        "User fetched successfully.",
        Me {
            id: user.id,
            email: user.email,
            name: user.name,
            email_verified: user.email_verified,
        },
    )
}
