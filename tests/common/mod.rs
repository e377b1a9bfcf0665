//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use warden::domain::models::{Task, TaskStatus};
use warden::domain::ports::{AlertSink, GitClient, ModeGateway, ModeRegistry, TaskStore};
use warden::infrastructure::alerts::TracingAlertSink;
use warden::infrastructure::database::{DatabaseConnection, SqliteTaskStore};
use warden::infrastructure::git::GitCli;
use warden::infrastructure::modes::{BuiltinModeRegistry, RegistryModeGateway};
use warden::services::{ExecutorConfig, ExecutorEngine, StateMachineConfig, TaskStateMachine};

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Open a migrated database in `dir` and wrap it in the task store.
///
/// File-backed so that every pooled connection sees the same data.
#[allow(dead_code)]
pub async fn setup_store(dir: &TempDir) -> (DatabaseConnection, Arc<SqliteTaskStore>) {
    let db = DatabaseConnection::initialize(&dir.path().join("warden.db"))
        .await
        .expect("failed to initialize test database");
    let store = Arc::new(SqliteTaskStore::new(db.pool().clone()));
    (db, store)
}

/// Insert a task ready for execution: spec frozen, status Running.
#[allow(dead_code)]
pub async fn seed_executable_task(store: &dyn TaskStore) -> Task {
    let mut task = Task::new("integration task").with_frozen_spec();
    task.status = TaskStatus::Running;
    store.insert(&task).await.expect("failed to insert task");
    task
}

/// Wire an engine with production adapters rooted under `work`.
///
/// Run artifacts land in `work/runs`, lock files in `work/locks`.
#[allow(dead_code)]
pub fn build_engine(store: Arc<SqliteTaskStore>, work: &Path) -> ExecutorEngine {
    build_engine_with_git(store, Arc::new(GitCli::new()), work)
}

/// Same wiring with a caller-supplied git client.
#[allow(dead_code)]
pub fn build_engine_with_git(
    store: Arc<SqliteTaskStore>,
    git: Arc<dyn GitClient>,
    work: &Path,
) -> ExecutorEngine {
    let store: Arc<dyn TaskStore> = store;
    let registry_impl = BuiltinModeRegistry::new();
    let registry: Arc<dyn ModeRegistry> = Arc::new(registry_impl.clone());
    let gateway: Arc<dyn ModeGateway> = Arc::new(RegistryModeGateway::new(registry_impl));
    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink::new());
    let state_machine = Arc::new(TaskStateMachine::new(
        store.clone(),
        gateway.clone(),
        alerts.clone(),
        StateMachineConfig::default(),
    ));
    ExecutorEngine::new(
        store,
        git,
        registry,
        gateway,
        alerts,
        state_machine,
        ExecutorConfig {
            runs_root: work.join("runs"),
            locks_dir: work.join("locks"),
        },
    )
}

/// Write a policy allowing the standard operation set against any path.
#[allow(dead_code)]
pub fn write_open_policy(dir: &Path) -> PathBuf {
    let path = dir.join("policy.json");
    let policy = serde_json::json!({
        "policy_id": "integration-open",
        "allowed_operations": [
            {"action": "write_file"},
            {"action": "update_file"},
            {"action": "mkdir"},
            {"action": "git_add"},
            {"action": "git_commit"},
            {"action": "delete_file"},
        ],
        "allowlist": {"paths": ["**"]},
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&policy).unwrap())
        .expect("failed to write policy file");
    path
}

/// Setup a git repository in a temp directory for testing
///
/// Creates an initialized git repo with an initial empty commit.
/// Returns the TempDir (for lifetime management) and the path to the repo.
#[allow(dead_code)]
pub fn setup_test_git_repo() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir for git repo");
    let path = dir.path().to_path_buf();

    // Initialize git repo
    let init_output = Command::new("git")
        .args(["init"])
        .current_dir(&path)
        .output()
        .expect("Failed to run git init");
    assert!(init_output.status.success(), "git init failed");

    // Configure git user for commits
    Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(&path)
        .output()
        .expect("Failed to set git user.email");

    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(&path)
        .output()
        .expect("Failed to set git user.name");

    // Create initial commit so we have a valid branch
    let commit_output = Command::new("git")
        .args(["commit", "--allow-empty", "-m", "initial commit"])
        .current_dir(&path)
        .output()
        .expect("Failed to create initial commit");
    assert!(commit_output.status.success(), "git commit failed");

    (dir, path)
}

/// Current HEAD commit of a repository, via the git binary.
#[allow(dead_code)]
pub fn git_head(repo: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo)
        .output()
        .expect("Failed to run git rev-parse");
    assert!(output.status.success(), "git rev-parse failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Porcelain status of a repository; empty means a clean tree and index.
#[allow(dead_code)]
pub fn git_status_porcelain(repo: &Path) -> String {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo)
        .output()
        .expect("Failed to run git status");
    assert!(output.status.success(), "git status failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
