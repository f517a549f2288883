use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    db::users::IdentityStore,
    error::{AuthError, AuthResult},
};

/// One-shot gate run before the listener is bound.
pub struct StartupGuard {
    store: Arc<dyn IdentityStore>,
    timeout: Duration,
}

impl StartupGuard {
    pub fn new(store: Arc<dyn IdentityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Ping the identity store once. A timeout counts as unavailable.
    pub async fn check_readiness(&self) -> AuthResult<()> {
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                info!("Identity store reachable");
                Ok(())
            }
            Ok(Err(e)) => Err(AuthError::DependencyUnavailable(format!(
                "identity store check failed, verify DATABASE_URL and database availability: {e}"
            ))),
            Err(_) => Err(AuthError::DependencyUnavailable(format!(
                "identity store did not answer within {:?}",
                self.timeout
            ))),
        }
    }
}
