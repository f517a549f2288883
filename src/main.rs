use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamview_api::{
    clock::{Clock, SystemClock},
    config::{Config, RefreshTracking},
    db::{self, users::{IdentityStore, PgIdentityStore}},
    routes,
    services::{
        auth::AuthService,
        readiness::StartupGuard,
        revocation::{InMemoryRevocationStore, PgRevocationStore, RedisRevocationStore},
        rotation::RotationPolicy,
        token::TokenCodec,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let config = Arc::new(config);

    let signing = Arc::new(config.signing_context().context("Invalid signing configuration")?);
    info!(
        algorithm = ?signing.algorithm(),
        access_ttl_secs = signing.access_ttl_secs(),
        refresh_ttl_secs = signing.refresh_ttl_secs(),
        "Signing context loaded"
    );
    if let Some(base_url) = &config.backend_base_url {
        info!("Public base URL: {}", base_url);
    }

    // Nothing listens until the identity store has answered.
    let pool = db::create_pool(&config.database_url, config.startup_probe_timeout)?;
    let users: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(pool.clone()));
    StartupGuard::new(users.clone(), config.startup_probe_timeout)
        .check_readiness()
        .await
        .context("Startup aborted")?;

    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let redis = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let conn = client.get_multiplexed_async_connection().await?;
            info!("Redis connected");
            Some(conn)
        }
        None => None,
    };

    let policy = match config.refresh_tracking {
        RefreshTracking::Database => RotationPolicy::tracked(
            Arc::new(PgRevocationStore::new(pool.clone())),
            config.revocation_timeout,
        ),
        RefreshTracking::Redis => {
            let conn = redis.clone().context("REDIS_URL is required for redis refresh tracking")?;
            let store = RedisRevocationStore::new(conn, clock.clone());
            RotationPolicy::tracked(Arc::new(store), config.revocation_timeout)
        }
        RefreshTracking::Memory => {
            warn!("In-memory refresh tracking: replay protection does not span processes");
            let store = InMemoryRevocationStore::new(clock.clone(), config.revocation_cache_capacity);
            RotationPolicy::tracked(Arc::new(store), config.revocation_timeout)
        }
        RefreshTracking::Disabled => {
            warn!("Refresh tracking disabled: token reuse cannot be detected and logout cannot revoke");
            RotationPolicy::Stateless
        }
    };
    info!(tracking = ?config.refresh_tracking, "Refresh rotation configured");

    let codec = TokenCodec::new(signing, clock);
    let auth = Arc::new(AuthService::new(users.clone(), codec, policy));

    let state = AppState {
        config: config.clone(),
        users,
        auth,
        redis,
    };

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("StreamView API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
