use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool manager
///
/// Manages the `SQLite` connection pool with WAL mode enabled for better
/// concurrency. Handles connection lifecycle, migrations, and configuration.
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Create a new database connection pool with WAL mode enabled
    ///
    /// # Arguments
    /// * `database_url` - `SQLite` database URL (e.g., "sqlite:.warden/warden.db")
    ///
    /// # Configuration
    /// - Journal mode: WAL (Write-Ahead Logging)
    /// - Synchronous: NORMAL (good balance of safety and performance)
    /// - Foreign keys: Enabled
    /// - Busy timeout: 5 seconds
    /// - Min connections: 5
    /// - Max connections: 10
    /// - Idle timeout: 30 seconds
    /// - Max lifetime: 30 minutes
    /// - Acquire timeout: 10 seconds
    ///
    /// # Returns
    /// * `Ok(DatabaseConnection)` on success
    /// * `Err` if database URL is invalid or connection fails
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(5)
            .max_connections(10)
            .idle_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(1800)) // 30 minutes
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("failed to create connection pool")?;

        Ok(Self { pool })
    }

    /// Open the database file at `path`, creating parent directories as
    /// needed, and apply pending migrations.
    pub async fn initialize(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let db = Self::new(&format!("sqlite:{}", path.display())).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations at startup
    ///
    /// Applies all pending migrations from the migrations/ directory.
    /// Safe to call multiple times - only applies new migrations.
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if migrations fail
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    ///
    /// Use this to pass the pool to store implementations.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool gracefully
    ///
    /// Closes all connections and waits for them to finish.
    /// Should be called during application shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_creates_and_migrates() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("nested").join("warden.db");

        let db = DatabaseConnection::initialize(&db_path)
            .await
            .expect("failed to initialize database");

        assert!(!db.pool().is_closed());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('tasks', 'task_audit') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .expect("failed to query tables");

        let names: Vec<String> = tables.into_iter().map(|t| t.0).collect();
        assert_eq!(names, vec!["task_audit", "tasks"]);

        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("warden.db");

        let db = DatabaseConnection::initialize(&db_path)
            .await
            .expect("failed to initialize database");
        db.migrate().await.expect("second migrate should be a no-op");

        db.close().await;
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("warden.db");

        let db = DatabaseConnection::initialize(&db_path)
            .await
            .expect("failed to initialize database");

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .expect("failed to check foreign keys pragma");
        assert_eq!(result.0, 1, "foreign keys should be enabled");

        db.close().await;
    }
}
