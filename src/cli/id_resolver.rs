//! Short ID prefix resolution for CLI commands.
//!
//! Allows users to specify any unique prefix of a task UUID instead of the
//! full 36-char ID, similar to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Resolve a task ID prefix to a full UUID.
pub async fn resolve_task_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    // Fast path: a full UUID needs no lookup
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{prefix}%");
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE id LIKE ?")
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    match rows.len() {
        0 => bail!("No task found matching '{}'", prefix),
        1 => Ok(Uuid::parse_str(&rows[0].0)?),
        n => {
            let mut msg = format!("Ambiguous prefix '{prefix}': matches {n} tasks:");
            for row in &rows {
                msg.push_str(&format!("\n  {}", row.0));
            }
            bail!("{}", msg)
        }
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!(
            "Invalid ID prefix '{}': must contain only hex characters and dashes",
            prefix
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use crate::domain::ports::TaskStore;
    use crate::infrastructure::database::{DatabaseConnection, SqliteTaskStore};

    async fn seeded_pool() -> (tempfile::TempDir, SqlitePool, Uuid) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = DatabaseConnection::initialize(&dir.path().join("warden.db"))
            .await
            .expect("failed to initialize database");
        let pool = db.pool().clone();
        let store = SqliteTaskStore::new(pool.clone());
        let task = Task::new("Prefix target");
        store.insert(&task).await.expect("insert failed");
        (dir, pool, task.id)
    }

    #[tokio::test]
    async fn test_full_uuid_resolves_without_lookup() {
        let (_dir, pool, id) = seeded_pool().await;
        let resolved = resolve_task_id(&pool, &id.to_string()).await.unwrap();
        assert_eq!(resolved, id);
    }

    #[tokio::test]
    async fn test_unique_prefix_resolves() {
        let (_dir, pool, id) = seeded_pool().await;
        let prefix = &id.to_string()[..8];
        let resolved = resolve_task_id(&pool, prefix).await.unwrap();
        assert_eq!(resolved, id);
    }

    #[tokio::test]
    async fn test_unknown_prefix_errors() {
        let (_dir, pool, id) = seeded_pool().await;
        // Flip the first character so the prefix cannot match
        let mut s = id.to_string();
        let replacement = if s.starts_with('0') { '1' } else { '0' };
        s.replace_range(0..1, &replacement.to_string());
        let err = resolve_task_id(&pool, &s[..8]).await.unwrap_err();
        assert!(err.to_string().contains("No task found"));
    }

    #[tokio::test]
    async fn test_invalid_prefix_characters() {
        let (_dir, pool, _id) = seeded_pool().await;
        let err = resolve_task_id(&pool, "zz!").await.unwrap_err();
        assert!(err.to_string().contains("Invalid ID prefix"));
    }
}
