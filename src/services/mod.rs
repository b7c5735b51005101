//! Services wired over one SQLite pool and one bundle root.

pub mod backup;
pub mod bundler;
pub mod catalog;
pub mod gun_store;
pub mod preset_store;
pub mod user_service;

use crate::{config::AppConfig, db, errors::InventoryResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Held by every record write and by backups, so the two never interleave.
pub type WriteGate = Arc<Mutex<()>>;

/// Every service of the inventory, sharing one pool and one write gate.
#[derive(Clone)]
pub struct Inventory {
    pub guns: gun_store::GunStore,
    pub presets: preset_store::PresetStore,
    pub users: user_service::UserService,
    pub bundler: bundler::Bundler,
    pub catalog: catalog::BundleCatalog,
    pub backups: backup::BackupService,
}

impl Inventory {
    /// Connect, create the schema if needed and build the services.
    pub async fn open(cfg: &AppConfig) -> InventoryResult<Self> {
        let pool = Arc::new(db::connect(&cfg.database_url).await?);
        db::run_migrations(&pool).await?;

        let gate = WriteGate::default();
        Ok(Self {
            guns: gun_store::GunStore::new(pool.clone(), gate.clone()),
            presets: preset_store::PresetStore::new(pool.clone(), gate.clone()),
            users: user_service::UserService::new(pool.clone()),
            bundler: bundler::Bundler::new(&cfg.bundle_dir),
            catalog: catalog::BundleCatalog::new(&cfg.bundle_dir),
            backups: backup::BackupService::new(pool, &cfg.backup_dir, cfg.backup_retain, gate),
        })
    }
}
