use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
pub(crate) async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Generate a new uuid-v4 entity ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an RFC3339 string — the canonical timestamp format for all tables.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it are
    /// logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("atelier.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = sqlx::ConnectOptions::log_slow_statements(
                opts,
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory storage for tests and one-shot tooling.
    ///
    /// A `:memory:` database is private to its physical connection, so the
    /// pool is capped at one connection — a second checkout would otherwise
    /// open a fresh, unmigrated database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    /// Per-domain storage structs share this SQLite connection pool.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Delete read notifications older than `days` days and return the count.
    /// Pass `0` to skip pruning.
    pub async fn prune_read_notifications(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        with_timeout(async {
            let cutoff = (chrono::Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
            let n = sqlx::query(
                "DELETE FROM notifications WHERE read_at IS NOT NULL AND created_at < ?",
            )
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
            Ok(n)
        })
        .await
    }

    /// Run SQLite VACUUM to reclaim disk space after pruning.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_migrates() {
        let storage = Storage::in_memory().await.unwrap();
        for table in [
            "users",
            "projects",
            "tasks",
            "milestones",
            "expenses",
            "procurement_items",
            "ffe_items",
            "baselines",
            "baseline_snapshots",
            "baseline_variances",
            "documents",
            "notifications",
            "ai_reports",
        ] {
            let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&storage.pool())
                .await
                .unwrap();
            assert_eq!(row.0, 0, "table {table} should exist and be empty");
        }
    }

    #[tokio::test]
    async fn test_prune_zero_days_is_noop() {
        let storage = Storage::in_memory().await.unwrap();
        let n = storage.prune_read_notifications(0).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_prune_read_notifications() {
        let storage = Storage::in_memory().await.unwrap();
        let pool = storage.pool();
        sqlx::query("INSERT INTO users (id, name, email, role, created_at) VALUES ('u1', 'A', 'a@x.io', 'member', '2024-01-01T00:00:00Z')")
            .execute(&pool)
            .await
            .unwrap();
        // One old read, one old unread, one recent read
        let old = "2020-01-01T00:00:00+00:00";
        let recent = chrono::Utc::now().to_rfc3339();
        for (id, read_at, created_at) in [
            ("n1", Some(old), old),
            ("n2", None, old),
            ("n3", Some(recent.as_str()), recent.as_str()),
        ] {
            sqlx::query(
                "INSERT INTO notifications (id, user_id, kind, title, body, read_at, created_at)
                 VALUES (?, 'u1', 'test', 't', '', ?, ?)",
            )
            .bind(id)
            .bind(read_at)
            .bind(created_at)
            .execute(&pool)
            .await
            .unwrap();
        }
        let n = storage.prune_read_notifications(30).await.unwrap();
        assert_eq!(n, 1); // only the old *read* notification is pruned
    }
}
