use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    db::users::IdentityStore,
    error::{ApiError, AuthError},
    models::{
        auth::{AuthenticatedUser, TokenPair, TokenType},
        user::{Identity, NewUser, User, UserRole},
    },
    services::{
        metrics,
        passwords::{hash_password, verify_password, verify_unknown_account, MIN_PASSWORD_LEN},
        rotation::{RefreshRotator, RotationPolicy},
        session::{SessionIssuer, SessionValidator},
        token::TokenCodec,
    },
};

/// Account-level flows built on the token core: register, login, refresh, logout.
pub struct AuthService {
    users: Arc<dyn IdentityStore>,
    issuer: SessionIssuer,
    validator: SessionValidator,
    rotator: RefreshRotator,
}

impl AuthService {
    pub fn new(users: Arc<dyn IdentityStore>, codec: TokenCodec, policy: RotationPolicy) -> Self {
        let issuer = SessionIssuer::new(codec.clone());
        let validator = SessionValidator::new(codec);
        let rotator = RefreshRotator::new(issuer.clone(), validator.clone(), policy);
        Self { users, issuer, validator, rotator }
    }

    /// Create an account and sign it in.
    pub async fn register(&self, email: &str, password: &str) -> Result<(User, TokenPair), ApiError> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(ApiError::Validation("Invalid email address".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            metrics::record("register", "conflict");
            return Err(ApiError::EmailTaken);
        }

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash: hash_password(password)?,
                role: UserRole::User,
            })
            .await?;

        let pair = self.issuer.issue(&Identity::from(&user))?;
        metrics::record("register", "success");
        info!(user_id = %user.id, "user registered");
        Ok((user, pair))
    }

    /// Resolve an active account from an email/password pair.
    ///
    /// Unknown email, wrong password and disabled account are indistinguishable.
    pub async fn find_by_credentials(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let Some(user) = self.users.find_by_email(&normalize_email(email)).await? else {
            verify_unknown_account(password);
            return Err(ApiError::InvalidCredentials);
        };

        // Checked after the hash so every branch pays one bcrypt verification.
        if !verify_password(password, &user.password_hash) || !user.is_active {
            return Err(ApiError::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), ApiError> {
        let user = match self.find_by_credentials(email, password).await {
            Ok(user) => user,
            Err(e) => {
                metrics::record("login", "failure");
                return Err(e);
            }
        };

        let pair = self.issuer.issue(&Identity::from(&user))?;
        metrics::record("login", "success");
        debug!(user_id = %user.id, "user logged in");
        Ok((user, pair))
    }

    /// Rotate a refresh token. The account is re-read so a disabled user or a
    /// changed role takes effect at the next rotation.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), ApiError> {
        let result = self.refresh_inner(refresh_token).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(ApiError::Token(e)) => e.kind(),
            Err(_) => "failure",
        };
        metrics::record("refresh", outcome);
        result
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<(User, TokenPair), ApiError> {
        let claims = self.validator.validate(refresh_token, TokenType::Refresh)?;
        let user_id = SessionValidator::subject(&claims)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::AccountUnavailable)?;

        let pair = self.rotator.rotate_validated(&claims, &Identity::from(&user)).await?;
        Ok((user, pair))
    }

    /// Supersede the presented refresh token. Invalid tokens are accepted
    /// silently so logout stays idempotent.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let claims = match self.validator.validate(refresh_token, TokenType::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(kind = e.kind(), "logout with unusable refresh token");
                metrics::record("logout", "ignored");
                return Ok(());
            }
        };

        if !self.rotator.policy().is_tracked() {
            debug!("refresh tracking disabled, logout cannot revoke");
        }
        self.rotator.revoke(&claims).await.map_err(|e| {
            metrics::record("logout", e.kind());
            ApiError::from(e)
        })?;

        metrics::record("logout", "success");
        Ok(())
    }

    /// Load the account behind a validated access token.
    pub async fn current_user(&self, auth: &AuthenticatedUser) -> Result<User, ApiError> {
        self.users
            .find_by_id(auth.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::AccountUnavailable)
    }

    /// Validate an access token into the caller's identity.
    pub fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.validator.validate(access_token, TokenType::Access)?;
        Ok(AuthenticatedUser {
            user_id: SessionValidator::subject(&claims)?,
            role: claims.role.unwrap_or_default(),
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && email.len() <= 320
}
