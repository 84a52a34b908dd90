use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::model::Stats;
use crate::AppState;
use crate::utils::success_to_api_response;

#[axum::debug_handler]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = Stats::compute(&state.store).await;
    (StatusCode::OK, success_to_api_response(stats))
}
