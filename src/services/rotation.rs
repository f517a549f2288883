use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AuthError, AuthResult},
    models::{
        auth::{Claims, TokenPair, TokenType},
        user::Identity,
    },
    services::{
        revocation::{MarkOutcome, RevocationStore},
        session::{SessionIssuer, SessionValidator},
    },
};

/// Whether rotation consults a revocation store.
#[derive(Clone)]
pub enum RotationPolicy {
    /// Stateless: reuse of a refresh token cannot be detected.
    Stateless,
    Tracked {
        store: Arc<dyn RevocationStore>,
        timeout: Duration,
    },
}

impl RotationPolicy {
    pub fn tracked(store: Arc<dyn RevocationStore>, timeout: Duration) -> Self {
        RotationPolicy::Tracked { store, timeout }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, RotationPolicy::Tracked { .. })
    }
}

/// Exchanges a refresh token for the next generation of tokens.
#[derive(Clone)]
pub struct RefreshRotator {
    issuer: SessionIssuer,
    validator: SessionValidator,
    policy: RotationPolicy,
}

impl RefreshRotator {
    pub fn new(issuer: SessionIssuer, validator: SessionValidator, policy: RotationPolicy) -> Self {
        Self { issuer, validator, policy }
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Validate `refresh_token`, supersede its generation and mint a new pair
    /// for the same subject and role.
    pub async fn rotate(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self.validator.validate(refresh_token, TokenType::Refresh)?;
        let identity = Identity {
            id: SessionValidator::subject(&claims)?,
            role: claims.role.unwrap_or_default(),
            is_active: true,
        };
        self.rotate_validated(&claims, &identity).await
    }

    /// Rotate claims the caller has already validated as a refresh token,
    /// issuing the new pair for `identity` (typically re-read from the store).
    pub async fn rotate_validated(&self, claims: &Claims, identity: &Identity) -> AuthResult<TokenPair> {
        debug_assert_eq!(claims.typ, TokenType::Refresh);
        if claims.sub != identity.id.to_string() {
            return Err(AuthError::Malformed);
        }

        self.supersede(claims).await?;
        self.issuer.issue(identity)
    }

    /// Mark the generation carried by `claims` superseded without issuing a
    /// successor. Used by logout; a second call is not an error.
    pub async fn revoke(&self, claims: &Claims) -> AuthResult<()> {
        match self.supersede(claims).await {
            Ok(()) | Err(AuthError::Revoked) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn supersede(&self, claims: &Claims) -> AuthResult<()> {
        let RotationPolicy::Tracked { store, timeout } = &self.policy else {
            return Ok(());
        };
        let rotation_id = claims.jti.as_deref().ok_or(AuthError::Malformed)?;

        let outcome = tokio::time::timeout(
            *timeout,
            store.mark_superseded(rotation_id, &claims.sub, claims.exp),
        )
        .await
        .map_err(|_| AuthError::DependencyUnavailable("revocation store timed out".into()))?
        .map_err(|e| AuthError::DependencyUnavailable(e.to_string()))?;

        match outcome {
            MarkOutcome::Marked => Ok(()),
            MarkOutcome::AlreadySuperseded => {
                tracing::warn!(
                    subject = %claims.sub,
                    rotation_id = %rotation_id,
                    "refresh token reuse detected"
                );
                Err(AuthError::Revoked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;
    use uuid::Uuid;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::models::user::UserRole;
    use crate::services::revocation::InMemoryRevocationStore;
    use crate::services::token::{SigningContext, TokenCodec};

    const T0: i64 = 1_700_000_000;

    struct Harness {
        issuer: SessionIssuer,
        validator: SessionValidator,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::at(T0));
            let ctx = SigningContext::new(
                b"rotation-secret",
                Algorithm::HS256,
                chrono::Duration::minutes(15),
                chrono::Duration::days(30),
            )
            .unwrap();
            let codec = TokenCodec::new(Arc::new(ctx), clock.clone());
            Self {
                issuer: SessionIssuer::new(codec.clone()),
                validator: SessionValidator::new(codec),
                clock,
            }
        }

        fn rotator(&self, policy: RotationPolicy) -> RefreshRotator {
            RefreshRotator::new(self.issuer.clone(), self.validator.clone(), policy)
        }

        fn tracked(&self) -> RotationPolicy {
            let store = InMemoryRevocationStore::new(self.clock.clone(), 1_000);
            RotationPolicy::tracked(Arc::new(store), Duration::from_secs(1))
        }

        fn login(&self) -> TokenPair {
            let identity = Identity { id: Uuid::new_v4(), role: UserRole::Admin, is_active: true };
            self.issuer.issue(&identity).unwrap()
        }
    }


    /// Store that never answers.
    struct StalledStore;

    #[async_trait]
    impl RevocationStore for StalledStore {
        async fn mark_superseded(&self, _: &str, _: &str, _: i64) -> Result<MarkOutcome, StoreError> {
            std::future::pending().await
        }

        async fn purge_expired(&self, _: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RevocationStore for BrokenStore {
        async fn mark_superseded(&self, _: &str, _: &str, _: i64) -> Result<MarkOutcome, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn purge_expired(&self, _: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_rotation_issues_next_generation() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let first = h.login();

        h.clock.advance(60);
        let next = rotator.rotate(&first.refresh.token).await.unwrap();

        assert_ne!(next.rotation_id(), first.rotation_id());
        assert_eq!(next.refresh.claims.sub, first.refresh.claims.sub);
        assert_eq!(next.access.claims.role, Some(UserRole::Admin));
        assert_eq!(next.access.claims.iat, T0 + 60);
        assert!(h.validator.validate(&next.access.token, TokenType::Access).is_ok());
    }

    #[tokio::test]
    async fn test_rotating_twice_is_revoked() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let first = h.login();

        rotator.rotate(&first.refresh.token).await.unwrap();
        assert!(matches!(rotator.rotate(&first.refresh.token).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_successor_can_rotate_again() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());

        let second = rotator.rotate(&h.login().refresh.token).await.unwrap();
        assert!(rotator.rotate(&second.refresh.token).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_one_winner() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());

        for _ in 0..20 {
            let token = h.login().refresh.token;
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let rotator = rotator.clone();
                    let token = token.clone();
                    tokio::spawn(async move { rotator.rotate(&token).await })
                })
                .collect();

            let mut successes = 0;
            let mut revoked = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => successes += 1,
                    Err(AuthError::Revoked) => revoked += 1,
                    Err(other) => panic!("unexpected failure: {other:?}"),
                }
            }
            assert_eq!((successes, revoked), (1, 1));
        }
    }

    #[tokio::test]
    async fn test_stateless_policy_cannot_detect_reuse() {
        let h = Harness::new();
        let rotator = h.rotator(RotationPolicy::Stateless);
        let first = h.login();

        assert!(rotator.rotate(&first.refresh.token).await.is_ok());
        assert!(rotator.rotate(&first.refresh.token).await.is_ok());
        assert!(!rotator.policy().is_tracked());
    }

    #[tokio::test]
    async fn test_access_token_cannot_rotate() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let pair = h.login();

        assert!(matches!(
            rotator.rotate(&pair.access.token).await,
            Err(AuthError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_cannot_rotate() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let pair = h.login();

        h.clock.set(pair.refresh.claims.exp);
        assert!(matches!(rotator.rotate(&pair.refresh.token).await, Err(AuthError::Expired)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_fails_closed() {
        let h = Harness::new();
        let rotator = h.rotator(RotationPolicy::tracked(Arc::new(StalledStore), Duration::from_millis(250)));

        assert!(matches!(
            rotator.rotate(&h.login().refresh.token).await,
            Err(AuthError::DependencyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_store_error_fails_closed() {
        let h = Harness::new();
        let rotator = h.rotator(RotationPolicy::tracked(Arc::new(BrokenStore), Duration::from_secs(1)));

        assert!(matches!(
            rotator.rotate(&h.login().refresh.token).await,
            Err(AuthError::DependencyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_blocks_later_rotation_and_is_idempotent() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let pair = h.login();

        rotator.revoke(&pair.refresh.claims).await.unwrap();
        rotator.revoke(&pair.refresh.claims).await.unwrap();
        assert!(matches!(rotator.rotate(&pair.refresh.token).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_rotate_validated_rejects_foreign_identity() {
        let h = Harness::new();
        let rotator = h.rotator(h.tracked());
        let pair = h.login();
        let stranger = Identity { id: Uuid::new_v4(), role: UserRole::User, is_active: true };

        assert!(matches!(
            rotator.rotate_validated(&pair.refresh.claims, &stranger).await,
            Err(AuthError::Malformed)
        ));
    }
}
