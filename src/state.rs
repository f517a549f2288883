use std::sync::Arc;

use crate::{config::Config, db::users::IdentityStore, services::auth::AuthService};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn IdentityStore>,
    pub auth: Arc<AuthService>,
    /// Present when REDIS_URL is configured; enables login rate limiting.
    pub redis: Option<redis::aio::MultiplexedConnection>,
}
