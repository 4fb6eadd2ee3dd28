use axum::extract::State;
use axum::Json;
use faceapi_core::ModelStatus;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    message: &'static str,
    version: &'static str,
    models: ModelStatus,
}

/// Liveness and loaded-model report. Never requires auth.
pub async fn handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        message: "Face API is running",
        version: env!("CARGO_PKG_VERSION"),
        models: state.engine.status(),
    })
}
