//! Core data models for the welding gun inventory.
//!
//! Guns, users and presets map to database tables via `sqlx::FromRow`; bundle
//! manifests map to the JSON sidecar kept in each attachment folder.

pub mod gun;
pub mod manifest;
pub mod preset;
pub mod user;
