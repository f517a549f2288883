use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    models::{
        auth::{Claims, IssuedToken, TokenPair, TokenType},
        user::Identity,
    },
    services::token::TokenCodec,
};

/// Mints access/refresh pairs for an already-verified identity.
///
/// The caller is responsible for checking the identity is active; the issuer
/// never touches a store.
#[derive(Clone)]
pub struct SessionIssuer {
    codec: TokenCodec,
}

impl SessionIssuer {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    pub fn issue(&self, identity: &Identity) -> AuthResult<TokenPair> {
        let now = self.codec.now();
        let rotation_id = Uuid::new_v4().to_string();
        let ctx = self.codec.context();

        let access = self.sign(Claims {
            sub: identity.id.to_string(),
            iat: now,
            exp: now + ctx.access_ttl_secs(),
            typ: TokenType::Access,
            jti: Some(rotation_id.clone()),
            role: Some(identity.role),
        })?;
        let refresh = self.sign(Claims {
            sub: identity.id.to_string(),
            iat: now,
            exp: now + ctx.refresh_ttl_secs(),
            typ: TokenType::Refresh,
            jti: Some(rotation_id),
            role: Some(identity.role),
        })?;

        tracing::debug!(subject = %identity.id, rotation_id = ?refresh.claims.jti, "issued token pair");
        Ok(TokenPair { access, refresh })
    }

    fn sign(&self, claims: Claims) -> AuthResult<IssuedToken> {
        let token = self.codec.encode(&claims)?;
        Ok(IssuedToken { token, claims })
    }
}

/// Checks a presented token and its type discriminator.
#[derive(Clone)]
pub struct SessionValidator {
    codec: TokenCodec,
}

impl SessionValidator {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    pub fn validate(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let claims = self.codec.decode(token)?;

        if claims.typ != expected {
            return Err(AuthError::WrongType { expected, found: claims.typ });
        }
        // Refresh tokens are useless for rotation without a generation id.
        if expected == TokenType::Refresh && claims.jti.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::Malformed);
        }
        Ok(claims)
    }

    /// Subject of validated claims as a user id.
    pub fn subject(claims: &Claims) -> AuthResult<Uuid> {
        claims.sub.parse().map_err(|_| AuthError::Malformed)
    }
}
