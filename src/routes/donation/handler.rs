use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::model::{CreateDonationRequest, Donation, DonationStatus};
use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorQuery {
    pub donor_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoQuery {
    pub ngo_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableQuery {
    #[serde(default)]
    pub ngo_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptDonationRequest {
    pub donation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub donation_id: String,
    pub status: DonationStatus,
}

#[axum::debug_handler]
pub async fn create_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let donation = Donation::create(
        &state.store,
        &state.sessions,
        state.proximity.as_ref(),
        state.geocoder.as_deref(),
        &claims.sub,
        req,
    )
    .await?;

    tracing::info!("donation {} created by {}", donation.id, claims.sub);
    Ok((StatusCode::CREATED, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let donation = Donation::get(&state.store, &query.id).await?;
    Ok((StatusCode::OK, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn find_by_donor(
    State(state): State<AppState>,
    Query(query): Query<DonorQuery>,
) -> Result<impl IntoResponse, AppError> {
    let donations =
        Donation::list_for_donor(&state.store, state.proximity.as_ref(), &query.donor_id).await?;
    Ok((StatusCode::OK, success_to_api_response(donations)))
}

#[axum::debug_handler]
pub async fn find_by_ngo(
    State(state): State<AppState>,
    Query(query): Query<NgoQuery>,
) -> Result<impl IntoResponse, AppError> {
    let donations = Donation::list_for_ngo(&state.store, &query.ngo_id).await;
    Ok((StatusCode::OK, success_to_api_response(donations)))
}

#[axum::debug_handler]
pub async fn find_available(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Result<impl IntoResponse, AppError> {
    let donations = Donation::list_available(
        &state.store,
        state.proximity.as_ref(),
        query.ngo_id.as_deref(),
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(donations)))
}

// 接受方身份取自令牌，不接受请求体里的 ngoId
#[axum::debug_handler]
pub async fn accept_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AcceptDonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let donation = Donation::accept(
        &state.store,
        &state.sessions,
        state.proximity.as_ref(),
        &req.donation_id,
        &claims.sub,
    )
    .await?;

    tracing::info!("donation {} accepted by {}", donation.id, claims.sub);
    Ok((StatusCode::OK, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let donation = Donation::update_status(
        &state.store,
        &state.sessions,
        &req.donation_id,
        req.status,
        &claims.sub,
    )
    .await?;

    tracing::info!("donation {} moved to {}", donation.id, donation.status);
    Ok((StatusCode::OK, success_to_api_response(donation)))
}
