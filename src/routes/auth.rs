use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::{AuthenticatedUser, LogoutRequest, RefreshRequest, TokenPairResponse},
        user::{LoginRequest, RegisterRequest, UserPublic},
    },
    state::AppState,
};

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenPairResponse>), ApiError> {
    let (user, pair) = state.auth.register(&body.email, &body.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse::new(pair, UserPublic::from(&user))),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    // Rate limit: 5 attempts per 15 min per email
    if let Some(mut redis) = state.redis.clone() {
        let rate_key = format!("rate:login:{}", body.email.trim().to_lowercase());
        check_rate_limit(&mut redis, &rate_key, 5, 900).await?;
    }

    let (user, pair) = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(TokenPairResponse::new(pair, UserPublic::from(&user))))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let (user, pair) = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(TokenPairResponse::new(pair, UserPublic::from(&user))))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.logout(&body.refresh_token).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<UserPublic>, ApiError> {
    let user = state.auth.current_user(&auth).await?;
    Ok(Json(UserPublic::from(&user)))
}
