/// Purge superseded refresh-token records whose token has expired anyway.
/// Run daily (e.g., via cron job: 0 3 * * * /app/purge-tokens)
///
/// Usage: purge-tokens [--dry-run]

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use streamview_api::services::revocation::{PgRevocationStore, RevocationStore};

#[derive(Parser)]
#[command(name = "purge-tokens", about = "Purge expired refresh-token rotation records")]
struct Args {
    /// Only count what would be removed
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let now = chrono::Utc::now();

    if args.dry_run {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM superseded_refresh_tokens WHERE expires_at <= $1",
        )
        .bind(now)
        .fetch_one(&pool)
        .await?;
        tracing::info!("{} expired rotation record(s) would be purged", count);
        return Ok(());
    }

    let purged = PgRevocationStore::new(pool).purge_expired(now.timestamp()).await?;
    tracing::info!("Purged {} expired rotation record(s)", purged);

    Ok(())
}
