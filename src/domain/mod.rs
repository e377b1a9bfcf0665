//! Domain layer for the warden execution safety core
//!
//! Core models, the closed error taxonomy, and the ports through which
//! collaborators are consumed.

pub mod error;
pub mod models;
pub mod ports;

pub use error::ExecError;
