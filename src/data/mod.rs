//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Table and relation declarations
//! - Row models

mod database;
mod models;
pub mod schema;

pub use database::Database;
pub use models::*;

#[cfg(test)]
mod database_test;
