//! Password change and recovery.
pub mod change;
pub mod reset;

use axum::routing::post;
use axum::{Router, middleware};

use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/change-password", post(change::handler))
        .route("/reset-request-password-2fa", post(reset::request_2fa))
        .route("/reset-password-2fa", post(reset::reset_2fa))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ));

    Router::new()
        // `POST /api/password/request-reset-password` goes to `request`.
        .route("/request-reset-password", post(reset::request))
        .route("/reset-password", post(reset::reset))
        .merge(authenticated)
}
