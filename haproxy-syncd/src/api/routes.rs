use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use shared::protocol::{APPLIED_CONFIG_PATH, LIVENESS_PATH};
use shared::types::AppliedConfig;
use crate::health::{HealthReporter, HealthStatus};

#[derive(Clone)]
pub struct AppState {
    pub health: HealthReporter,
    pub applied_rx: watch::Receiver<Option<AppliedConfig>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(LIVENESS_PATH, get(get_liveness))
        .route(APPLIED_CONFIG_PATH, get(get_applied_config))
        .with_state(state)
}

async fn get_liveness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health.status();
    let code = if status.down {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}

async fn get_applied_config(
    State(state): State<AppState>,
) -> Result<Json<AppliedConfig>, StatusCode> {
    state
        .applied_rx
        .borrow()
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
