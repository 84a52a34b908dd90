use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use super::model::{CreateMessageRequest, MarkReadRequest, Message};
use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: bool,
}

#[axum::debug_handler]
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = Message::send(
        &state.store,
        &state.sessions,
        &req.chat_id,
        &claims.sub,
        &req.receiver_id,
        &req.content,
    )
    .await?;

    // 重复提交返回窗口内已存在的那条，对调用方透明
    Ok((
        StatusCode::CREATED,
        success_to_api_response(outcome.message().clone()),
    ))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated =
        Message::mark_read(&state.store, &state.sessions, &req.chat_id, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MarkReadResponse { updated }),
    ))
}
