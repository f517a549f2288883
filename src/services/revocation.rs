//! Tracking of superseded refresh-token generations.
//!
//! A rotation id may be marked superseded exactly once. Each backend makes the
//! mark a single atomic operation, so two concurrent rotations of the same
//! refresh token cannot both observe [`MarkOutcome::Marked`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::{future::Cache, policy::EvictionPolicy, Expiry};
use sqlx::PgPool;

use crate::{clock::Clock, error::StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadySuperseded,
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Atomically record `rotation_id` as superseded.
    ///
    /// `expires_at` is the refresh token's own expiry (epoch seconds); the
    /// record is only needed until then.
    async fn mark_superseded(
        &self,
        rotation_id: &str,
        subject: &str,
        expires_at: i64,
    ) -> Result<MarkOutcome, StoreError>;

    /// Drop records whose token has expired anyway. Returns how many went, or 0
    /// for backends that expire records on their own.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// Postgres-backed store. The primary key on `rotation_id` is the guard.
#[derive(Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_datetime(epoch_secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {epoch_secs}")))
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn mark_superseded(
        &self,
        rotation_id: &str,
        subject: &str,
        expires_at: i64,
    ) -> Result<MarkOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO superseded_refresh_tokens (rotation_id, subject, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (rotation_id) DO NOTHING",
        )
        .bind(rotation_id)
        .bind(subject)
        .bind(to_datetime(expires_at)?)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            MarkOutcome::Marked
        } else {
            MarkOutcome::AlreadySuperseded
        })
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM superseded_refresh_tokens WHERE expires_at <= $1")
            .bind(to_datetime(now)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Redis-backed store using `SET NX` with a TTL matching the token expiry.
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: redis::aio::MultiplexedConnection,
    clock: Arc<dyn Clock>,
}

impl RedisRevocationStore {
    pub fn new(conn: redis::aio::MultiplexedConnection, clock: Arc<dyn Clock>) -> Self {
        Self { conn, clock }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn mark_superseded(
        &self,
        rotation_id: &str,
        subject: &str,
        expires_at: i64,
    ) -> Result<MarkOutcome, StoreError> {
        let ttl = record_ttl(expires_at, self.clock.now());
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("superseded:{rotation_id}"))
            .arg(subject)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await?;

        Ok(match reply {
            Some(_) => MarkOutcome::Marked,
            None => MarkOutcome::AlreadySuperseded,
        })
    }

    async fn purge_expired(&self, _now: i64) -> Result<u64, StoreError> {
        // Keys carry their own TTL.
        Ok(0)
    }
}

/// Seconds a superseded record must outlive `now`. `EX` needs at least one.
fn record_ttl(expires_at: i64, now: i64) -> i64 {
    (expires_at - now).max(1)
}

/// Entries live until the refresh token they guard would have expired.
struct SupersededExpiry;

impl Expiry<String, Instant> for SupersededExpiry {
    fn expire_after_create(&self, _key: &String, value: &Instant, created_at: Instant) -> Option<Duration> {
        Some(value.saturating_duration_since(created_at))
    }
}

/// Single-process store on a [`moka::future::Cache`].
///
/// Each record expires with its token. `max_capacity` bounds memory; once it is
/// reached the least recently used record is evicted, which re-opens that
/// generation to reuse, so size it above the number of live refresh tokens.
pub struct InMemoryRevocationStore {
    superseded: Cache<String, Instant>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationStore {
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(clock: Arc<dyn Clock>, max_capacity: u64) -> Self {
        let superseded = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(SupersededExpiry)
            .build();
        Self { superseded, clock }
    }

    #[cfg(test)]
    async fn tracked(&self) -> u64 {
        self.superseded.run_pending_tasks().await;
        self.superseded.entry_count()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn mark_superseded(
        &self,
        rotation_id: &str,
        _subject: &str,
        expires_at: i64,
    ) -> Result<MarkOutcome, StoreError> {
        let remaining = u64::try_from(expires_at - self.clock.now()).unwrap_or(0);
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(remaining))
            .ok_or_else(|| StoreError::Backend(format!("expiry out of range: {expires_at}")))?;

        // The entry API initialises a missing key once, even under contention.
        let entry = self
            .superseded
            .entry(rotation_id.to_string())
            .or_insert(deadline)
            .await;

        Ok(if entry.is_fresh() {
            MarkOutcome::Marked
        } else {
            MarkOutcome::AlreadySuperseded
        })
    }

    async fn purge_expired(&self, _now: i64) -> Result<u64, StoreError> {
        // Records carry their own TTL; this only forces a maintenance pass.
        self.superseded.run_pending_tasks().await;
        Ok(0)
    }
}
