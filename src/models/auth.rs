use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{UserPublic, UserRole};

/// Discriminator carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims embedded in both access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user UUID
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenType,
    /// Rotation identifier shared by one access/refresh generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

/// A signed token together with the claims it was built from.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

impl TokenPair {
    pub fn rotation_id(&self) -> Option<&str> {
        self.refresh.claims.jti.as_deref()
    }
}

/// Extracted from a validated access token, available via the axum extractor
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Body returned by register, login and refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String, // always "bearer"
    pub expires_in: i64,
    pub user: UserPublic,
}

impl TokenPairResponse {
    pub fn new(pair: TokenPair, user: UserPublic) -> Self {
        let claims = &pair.access.claims;
        Self {
            expires_in: claims.exp - claims.iat,
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "bearer".to_string(),
            user,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}
