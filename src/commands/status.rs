use axum::extract::State;
use axum::Json;

use super::StatusResponse;
use crate::AppState;

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.ai.try_ready().map(|services| services.search.stats());
    Json(StatusResponse {
        status: state.ai.status_label(),
        stats,
        error: state.ai.error(),
    })
}
