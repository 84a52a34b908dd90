use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{MarkNotificationReadRequest, Notification, UnreadCountResponse};
use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

#[axum::debug_handler]
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let notifications = Notification::list_for_user(&state.store, &claims.sub).await;
    (StatusCode::OK, success_to_api_response(notifications))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let count = Notification::unread_count(&state.store, &claims.sub).await;
    (
        StatusCode::OK,
        success_to_api_response(UnreadCountResponse { count }),
    )
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkNotificationReadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let notification =
        Notification::mark_read(&state.store, &req.notification_id, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(notification)))
}
