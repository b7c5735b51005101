//! src/services/gun_store.rs
//!
//! GunStore: CRUD, search and statistics over the `guns` table. Every
//! write commits on its own and holds the shared write gate, so a database
//! backup never observes a half-applied change.

use crate::{
    errors::{InventoryError, InventoryResult, is_unique_violation},
    models::gun::{Gun, GunDraft, NewGun, Statistics},
    services::WriteGate,
};
use chrono::Local;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

const GUN_COLUMNS: &str = "id, name, type, model, serial_number, status, location, \
                           last_maintenance, notes, created_at, updated_at, created_by";

#[derive(Clone)]
pub struct GunStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    gate: WriteGate,
}

impl GunStore {
    pub fn new(db: Arc<SqlitePool>, gate: WriteGate) -> Self {
        Self { db, gate }
    }

    /// Validate `draft` and insert it. Returns the stored gun with its new id.
    ///
    /// A duplicate serial number yields `ConstraintViolation`.
    pub async fn create(&self, draft: GunDraft) -> InventoryResult<Gun> {
        let gun = draft.validate()?;
        let _guard = self.gate.lock().await;

        let insert = sqlx::query_as::<_, Gun>(&format!(
            "INSERT INTO guns (name, type, model, serial_number, status, location,
                               last_maintenance, notes, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {GUN_COLUMNS}"
        ))
        .bind(&gun.name)
        .bind(&gun.gun_type)
        .bind(&gun.model)
        .bind(&gun.serial_number)
        .bind(gun.status)
        .bind(&gun.location)
        .bind(&gun.last_maintenance)
        .bind(&gun.notes)
        .bind(gun.created_at)
        .bind(&gun.created_by)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| map_write_error(err, &gun))?;

        info!(id = insert.id, name = %insert.name, "gun created");
        Ok(insert)
    }

    /// Fetch one gun, `None` when the id is unknown.
    pub async fn get(&self, id: i64) -> InventoryResult<Option<Gun>> {
        let gun = sqlx::query_as::<_, Gun>(&format!("SELECT {GUN_COLUMNS} FROM guns WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(gun)
    }

    /// All guns ordered by name.
    pub async fn list(&self) -> InventoryResult<Vec<Gun>> {
        let guns = sqlx::query_as::<_, Gun>(&format!(
            "SELECT {GUN_COLUMNS} FROM guns ORDER BY name, id"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(guns)
    }

    /// Guns whose name, type, model or location contains `term`, ignoring case.
    ///
    /// Matching is a plain substring test with Unicode lowercasing, so `É`
    /// finds `é` and `%` or `_` match literally. An empty term returns everything.
    pub async fn search(&self, term: &str) -> InventoryResult<Vec<Gun>> {
        let needle = term.to_lowercase();
        let guns: Vec<Gun> = self
            .list()
            .await?
            .into_iter()
            .filter(|gun| matches_term(gun, &needle))
            .collect();
        debug!(term, hits = guns.len(), "gun search");
        Ok(guns)
    }

    /// Replace every editable field of gun `id` and stamp `updated_at`.
    ///
    /// `created_at` and `created_by` of the stored row are left alone.
    pub async fn update(&self, id: i64, draft: GunDraft) -> InventoryResult<Gun> {
        let gun = draft.validate()?;
        let _guard = self.gate.lock().await;

        let updated = sqlx::query_as::<_, Gun>(&format!(
            "UPDATE guns SET
                name = ?, type = ?, model = ?, serial_number = ?, status = ?,
                location = ?, last_maintenance = ?, notes = ?, updated_at = ?
             WHERE id = ?
             RETURNING {GUN_COLUMNS}"
        ))
        .bind(&gun.name)
        .bind(&gun.gun_type)
        .bind(&gun.model)
        .bind(&gun.serial_number)
        .bind(gun.status)
        .bind(&gun.location)
        .bind(&gun.last_maintenance)
        .bind(&gun.notes)
        .bind(Local::now().naive_local())
        .bind(id)
        .fetch_optional(&*self.db)
        .await
        .map_err(|err| map_write_error(err, &gun))?
        .ok_or(InventoryError::GunNotFound(id))?;

        info!(id, name = %updated.name, "gun updated");
        Ok(updated)
    }

    /// Remove gun `id`. Attachment bundles are keyed separately and stay on disk.
    pub async fn delete(&self, id: i64) -> InventoryResult<()> {
        let _guard = self.gate.lock().await;
        let result = sqlx::query("DELETE FROM guns WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::GunNotFound(id));
        }
        info!(id, "gun deleted");
        Ok(())
    }

    /// Totals by status and by type, computed on every call.
    pub async fn statistics(&self) -> InventoryResult<Statistics> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guns")
            .fetch_one(&*self.db)
            .await?;

        let status_distribution = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM guns GROUP BY status",
        )
        .fetch_all(&*self.db)
        .await?
        .into_iter()
        .collect();

        let type_distribution = sqlx::query_as::<_, (String, i64)>(
            "SELECT type, COUNT(*) FROM guns WHERE type IS NOT NULL GROUP BY type",
        )
        .fetch_all(&*self.db)
        .await?
        .into_iter()
        .collect();

        Ok(Statistics {
            total,
            status_distribution,
            type_distribution,
        })
    }
}

fn map_write_error(err: sqlx::Error, gun: &NewGun) -> InventoryError {
    if is_unique_violation(&err) {
        InventoryError::ConstraintViolation(format!(
            "serial number `{}` is already registered",
            gun.serial_number.as_deref().unwrap_or_default()
        ))
    } else {
        InventoryError::Sqlx(err)
    }
}

fn matches_term(gun: &Gun, needle: &str) -> bool {
    [
        Some(gun.name.as_str()),
        gun.gun_type.as_deref(),
        gun.model.as_deref(),
        gun.location.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}
