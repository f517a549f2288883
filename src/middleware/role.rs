use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::ApiError,
    models::{auth::AuthenticatedUser, user::UserRole},
    state::AppState,
};

/// Reject the caller unless their token carries one of `allowed`.
/// An empty list admits every authenticated caller.
pub fn require_role(user: &AuthenticatedUser, allowed: &[UserRole]) -> Result<(), ApiError> {
    if allowed.is_empty() || allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Extractor for admin-only handlers. Missing or invalid tokens are still 401.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthenticatedUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        require_role(&user, &[UserRole::Admin])?;
        Ok(RequireAdmin(user))
    }
}
