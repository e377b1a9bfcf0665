//! SQLite persistence for tasks and their audit rows.

pub mod connection;
pub mod task_store;
pub mod utils;

pub use connection::DatabaseConnection;
pub use task_store::SqliteTaskStore;
