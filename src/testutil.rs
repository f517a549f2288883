//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use uuid::Uuid;

use crate::{
    clock::ManualClock,
    config::Config,
    db::users::IdentityStore,
    error::StoreError,
    models::user::{NewUser, User, UserRole},
    services::{
        auth::AuthService,
        revocation::InMemoryRevocationStore,
        rotation::RotationPolicy,
        token::{SigningContext, TokenCodec},
    },
    state::AppState,
};

pub const TEST_EPOCH: i64 = 1_700_000_000;

/// Codec with a 15 minute / 30 day context and a clock frozen at [`TEST_EPOCH`].
pub fn test_codec() -> (TokenCodec, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(TEST_EPOCH));
    let ctx = SigningContext::new(
        b"test-secret",
        Algorithm::HS256,
        chrono::Duration::minutes(15),
        chrono::Duration::days(30),
    )
    .unwrap();
    (TokenCodec::new(Arc::new(ctx), clock.clone()), clock)
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    users: Mutex<HashMap<Uuid, User>>,
    unreachable: AtomicBool,
    ping_delay: Mutex<Option<Duration>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_active(&self, id: Uuid, is_active: bool) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.is_active = is_active;
        }
    }

    pub fn set_role(&self, id: Uuid, role: UserRole) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.role = role.to_string();
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check_reachable()?;
        Ok(self.users.lock().unwrap().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.check_reachable()?;
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        self.check_reachable()?;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} taken", user.email)));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            role: user.role.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let delay = *self.ping_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()
    }
}

/// Router state over in-memory stores with memory revocation tracking.
pub fn test_state() -> AppState {
    test_state_with(Arc::new(InMemoryIdentityStore::new()))
}

pub fn test_state_with(users: Arc<InMemoryIdentityStore>) -> AppState {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/streamview_test".into()),
        "JWT_SECRET" => Some("test-secret".into()),
        "REFRESH_TOKEN_TRACKING" => Some("memory".into()),
        _ => None,
    })
    .unwrap();

    let (codec, clock) = test_codec();
    let store = InMemoryRevocationStore::new(clock, InMemoryRevocationStore::DEFAULT_CAPACITY);
    let policy = RotationPolicy::tracked(Arc::new(store), config.revocation_timeout);
    let users: Arc<dyn IdentityStore> = users;

    AppState {
        config: Arc::new(config),
        auth: Arc::new(AuthService::new(users.clone(), codec, policy)),
        users,
        redis: None,
    }
}
