use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::auth::TokenType;

/// Precise failure kinds of the token core.
///
/// Callers get the exact cause; the HTTP boundary collapses every
/// token-level kind into one uniform rejection (see [`ApiError`]).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongType { expected: TokenType, found: TokenType },

    #[error("Refresh token revoked")]
    Revoked,

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Expired => "expired",
            AuthError::WrongType { .. } => "wrong_type",
            AuthError::Revoked => "revoked",
            AuthError::DependencyUnavailable(_) => "dependency_unavailable",
            AuthError::Signing(_) => "signing",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            // A different algorithm in the header means the token cannot
            // verify under the configured key.
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Malformed,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Failures reported by the identity and revocation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Errors as seen by HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] AuthError),

    #[error("Not authenticated")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found or inactive")]
    AccountUnavailable,

    #[error("Not enough permissions")]
    Forbidden,

    #[error("Email already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Too many attempts, retry in a few minutes")]
    RateLimited,

    #[error("Service temporarily unavailable")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => ApiError::EmailTaken,
            StoreError::Backend(msg) => ApiError::Unavailable(msg),
        }
    }
}

const UNIFORM_TOKEN_REJECTION: &str = "Invalid or expired token";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Token(AuthError::DependencyUnavailable(cause)) | ApiError::Unavailable(cause) => {
                tracing::warn!(cause = %cause, "dependency unavailable while serving request");
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string())
            }
            ApiError::Token(AuthError::Signing(cause)) => {
                tracing::error!(cause = %cause, "token signing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Token(err) => {
                tracing::debug!(kind = err.kind(), "token rejected");
                (StatusCode::UNAUTHORIZED, UNIFORM_TOKEN_REJECTION.to_string())
            }
            ApiError::MissingCredentials | ApiError::InvalidCredentials | ApiError::AccountUnavailable => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

    #[test]
    fn test_jsonwebtoken_kinds_map_to_precise_failures() {
        assert!(matches!(
            AuthError::from(JwtError::from(ErrorKind::InvalidSignature)),
            AuthError::InvalidSignature
        ));
        assert!(matches!(
            AuthError::from(JwtError::from(ErrorKind::InvalidAlgorithm)),
            AuthError::InvalidSignature
        ));
        assert!(matches!(
            AuthError::from(JwtError::from(ErrorKind::ExpiredSignature)),
            AuthError::Expired
        ));
        assert!(matches!(
            AuthError::from(JwtError::from(ErrorKind::InvalidToken)),
            AuthError::Malformed
        ));
        assert!(matches!(
            AuthError::from(JwtError::from(ErrorKind::MissingRequiredClaim("exp".into()))),
            AuthError::Malformed
        ));
    }

    #[test]
    fn test_token_failures_are_uniform_on_the_wire() {
        let failures = [
            AuthError::Malformed,
            AuthError::InvalidSignature,
            AuthError::Expired,
            AuthError::WrongType { expected: TokenType::Access, found: TokenType::Refresh },
            AuthError::Revoked,
        ];

        for failure in failures {
            let response = ApiError::from(failure).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_dependency_failure_is_service_unavailable() {
        let response =
            ApiError::from(AuthError::DependencyUnavailable("timeout".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_conflict_maps_to_email_taken() {
        let err = ApiError::from(StoreError::Conflict("users_email_key".into()));
        assert!(matches!(err, ApiError::EmailTaken));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
