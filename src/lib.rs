//! Welding gun inventory: equipment records in SQLite plus per-record
//! attachment bundles on disk.

pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod services;

pub use errors::{InventoryError, InventoryResult};
pub use services::Inventory;
