use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::model::{Chat, ChatInfo};
use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationQuery {
    pub donation_id: String,
}

// 只返回令牌持有者自己的会话
#[axum::debug_handler]
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let chats = Chat::list_for_user(&state.store, &claims.sub).await;
    let mut enriched = Vec::with_capacity(chats.len());
    for chat in chats {
        enriched.push(Chat::enrich(&state.store, chat).await);
    }
    Ok((
        StatusCode::OK,
        success_to_api_response::<Vec<ChatInfo>>(enriched),
    ))
}

#[axum::debug_handler]
pub async fn find_by_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let chat = Chat::for_donation(&state.store, &query.donation_id).await?;
    if !chat.has_participant(&claims.sub) {
        return Err(AppError::NotFound("chat"));
    }
    let enriched = Chat::enrich(&state.store, chat).await;
    Ok((StatusCode::OK, success_to_api_response(enriched)))
}
