use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::model::{LoginRequest, RegisterRequest, UpdateUserRequest, User, UserInfo};
use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, generate_token, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserInfo,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct EmailCheckResponse {
    pub exists: bool,
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::register(&state.store, state.geocoder.as_deref(), req).await?;
    let (token, expires_at) = generate_token(&user.id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to issue token: {}", e)))?;

    tracing::info!("registered {} ({})", user.id, user.email);
    Ok((
        StatusCode::CREATED,
        success_to_api_response(AuthResponse {
            user: UserInfo::from(user),
            token,
            expires_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::authenticate(&state.store, req).await?;
    let (token, expires_at) = generate_token(&user.id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to issue token: {}", e)))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(AuthResponse {
            user: UserInfo::from(user),
            token,
            expires_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn check_email(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> impl IntoResponse {
    let exists = User::email_exists(&state.store, &query.email).await;
    (
        StatusCode::OK,
        success_to_api_response(EmailCheckResponse { exists }),
    )
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .users
        .get(&query.id)
        .await
        .ok_or(AppError::NotFound("user"))?;
    Ok((StatusCode::OK, success_to_api_response(UserInfo::from(user))))
}

// 只允许更新自己的资料，身份取自令牌
#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user =
        User::update_profile(&state.store, state.geocoder.as_deref(), &claims.sub, req).await?;
    Ok((StatusCode::OK, success_to_api_response(UserInfo::from(user))))
}
