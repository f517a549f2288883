use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    clock::Clock,
    config::ConfigError,
    error::{AuthError, AuthResult},
    models::auth::Claims,
};

/// Process-wide signing material and token lifetimes.
///
/// Built once at startup and shared read-only by every codec.
pub struct SigningContext {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl SigningContext {
    pub fn new(
        secret: &[u8],
        algorithm: Algorithm,
        access_ttl: chrono::Duration,
        refresh_ttl: chrono::Duration,
    ) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::Empty("JWT_SECRET"));
        }
        // The key material is a shared secret, so only HMAC algorithms make sense.
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }
        if access_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                key: "ACCESS_TOKEN_EXPIRE_MINUTES",
                value: access_ttl.num_minutes().to_string(),
            });
        }
        if refresh_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                key: "REFRESH_TOKEN_EXPIRE_DAYS",
                value: refresh_ttl.num_days().to_string(),
            });
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs())
            .field("refresh_ttl_secs", &self.refresh_ttl_secs())
            .finish()
    }
}

/// Encodes and verifies signed tokens. Cheap to clone.
#[derive(Clone)]
pub struct TokenCodec {
    ctx: Arc<SigningContext>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(ctx: Arc<SigningContext>, clock: Arc<dyn Clock>) -> Self {
        Self { ctx, clock }
    }

    pub fn context(&self) -> &SigningContext {
        &self.ctx
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn encode(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(self.ctx.algorithm), claims, &self.ctx.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify `token` and check its expiry against the injected clock.
    pub fn decode(&self, token: &str) -> AuthResult<Claims> {
        self.decode_at(token, self.clock.now())
    }

    pub fn decode_at(&self, token: &str, now: i64) -> AuthResult<Claims> {
        let mut validation = Validation::new(self.ctx.algorithm);
        // Expiry is judged below against our own clock, with no leeway.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let claims = decode::<Claims>(token, &self.ctx.decoding_key, &validation)?.claims;

        if now >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}
