use crate::error::ApiError;

/// Checks a key-scoped rate limit stored in Redis.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for `key`
/// - On first increment, sets TTL to `window_secs`
/// - Rejects once the counter exceeds `max_attempts`
///
/// Redis errors let the request through; the limiter is not a security boundary.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> Result<(), ApiError> {
    let count: u64 = match redis::cmd("INCR").arg(key).query_async(redis).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("rate limit check skipped for {key}: {e}");
            return Ok(());
        }
    };

    if count == 1 {
        // Set TTL only on first increment to avoid resetting the window on each attempt
        let _: Result<(), _> = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await;
    }

    if count > max_attempts {
        return Err(ApiError::RateLimited);
    }

    Ok(())
}
