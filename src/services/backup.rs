//! Database snapshots written with `VACUUM INTO`, one-shot or on a timer.

use crate::{errors::InventoryResult, services::WriteGate};
use chrono::Local;
use sqlx::SqlitePool;
use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};
use tokio::{fs, task::JoinHandle, time};
use tracing::{debug, error, info};

const BACKUP_PREFIX: &str = "backup_";

#[derive(Clone)]
pub struct BackupService {
    pub db: Arc<SqlitePool>,
    pub dir: PathBuf,
    /// How many backups to keep; older ones are pruned after each run.
    pub retain: usize,
    gate: WriteGate,
}

impl BackupService {
    pub fn new(db: Arc<SqlitePool>, dir: impl Into<PathBuf>, retain: usize, gate: WriteGate) -> Self {
        Self {
            db,
            dir: dir.into(),
            retain,
            gate,
        }
    }

    /// Write `backup_<timestamp>.db` and prune old backups. Record writes wait meanwhile.
    pub async fn backup_now(&self) -> InventoryResult<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!(
            "{BACKUP_PREFIX}{}.db",
            Local::now().format("%Y%m%d_%H%M%S_%3f")
        ));

        {
            let _guard = self.gate.lock().await;
            sqlx::query("VACUUM INTO ?")
                .bind(path.to_string_lossy().into_owned())
                .execute(&*self.db)
                .await?;
        }
        info!(backup = %path.display(), "database backed up");

        self.prune().await?;
        Ok(path)
    }

    /// Existing backups, oldest first.
    pub async fn list(&self) -> InventoryResult<Vec<PathBuf>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(BACKUP_PREFIX) && name.ends_with(".db") {
                backups.push(entry.path());
            }
        }
        // Timestamped names sort chronologically.
        backups.sort();
        Ok(backups)
    }

    async fn prune(&self) -> InventoryResult<()> {
        let backups = self.list().await?;
        let excess = backups.len().saturating_sub(self.retain);
        for old in &backups[..excess] {
            fs::remove_file(old).await?;
            debug!(backup = %old.display(), "pruned old backup");
        }
        Ok(())
    }

    /// Run [`Self::backup_now`] every `interval`, starting one interval from now.
    ///
    /// Failures are logged and the loop carries on. Abort the handle to stop it.
    pub fn spawn_periodic(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if let Err(err) = self.backup_now().await {
                    error!(error = %err, "automatic backup failed");
                }
            }
        })
    }
}
