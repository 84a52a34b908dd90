use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::AppState;
use crate::error::AppError;
use crate::utils::verify_token;

// 校验 Bearer 令牌并把 Claims 放进请求扩展，后续 handler 取 Extension<Claims>
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AppError::Unauthorized("missing authorization header".into()));
    };

    let claims = verify_token(bearer.token(), &state.config)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
