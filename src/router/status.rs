//! Liveness, public server information and metrics.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Envelope;

/// Public server information.
#[derive(Serialize)]
pub struct Status {
    name: String,
    version: String,
}

pub async fn root() -> Json<Envelope<()>> {
    Envelope::text("Server is running")
}

pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        name: state.config.name.clone(),
        version: state.config.version().to_owned(),
    })
}

/// Prometheus exposition format.
pub async fn metrics(State(state): State<AppState>) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::NotFound("Metrics are disabled."))
}
