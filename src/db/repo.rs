use super::model::{epoch_seconds, SentRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL with full sync so each committed send survives a crash.
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url: {}", normalized))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and create the parent
/// directory. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn is_sent(pool: &Pool, url: &str) -> Result<bool> {
    let hit = sqlx::query_scalar::<_, i64>("SELECT 1 FROM sent_items WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;
    Ok(hit.is_some())
}

/// Insert a sent record; an existing url keeps its original timestamp.
/// Returns whether a new row was written.
#[instrument(skip(pool))]
pub async fn insert_sent(pool: &Pool, url: &str, at: DateTime<Utc>) -> Result<bool> {
    let res = sqlx::query("INSERT OR IGNORE INTO sent_items (url, timestamp) VALUES (?, ?)")
        .bind(url)
        .bind(epoch_seconds(at))
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip(pool))]
pub async fn delete_sent_before(pool: &Pool, cutoff: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query("DELETE FROM sent_items WHERE timestamp < ?")
        .bind(epoch_seconds(cutoff))
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_sent(pool: &Pool) -> Result<i64> {
    let cnt = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sent_items")
        .fetch_one(pool)
        .await?;
    Ok(cnt)
}

pub async fn get_sent(pool: &Pool, url: &str) -> Result<Option<SentRecord>> {
    let rec = sqlx::query_as::<_, SentRecord>(
        "SELECT url, timestamp FROM sent_items WHERE url = ?",
    )
    .bind(url)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}
