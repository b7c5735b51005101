//! src/services/preset_store.rs
//!
//! PresetStore: list, lookup and validated insert over the `presets` table.

use crate::{
    errors::InventoryResult,
    models::preset::{Preset, PresetDraft},
    services::WriteGate,
};
use sqlx::{SqlitePool, types::Json};
use std::sync::Arc;
use tracing::info;

const PRESET_COLUMNS: &str = "id, name, gun_type, parameters, description, created_at";

#[derive(Clone)]
pub struct PresetStore {
    db: Arc<SqlitePool>,
    gate: WriteGate,
}

impl PresetStore {
    pub fn new(db: Arc<SqlitePool>, gate: WriteGate) -> Self {
        Self { db, gate }
    }

    /// All presets ordered by name.
    pub async fn list(&self) -> InventoryResult<Vec<Preset>> {
        let presets = sqlx::query_as::<_, Preset>(&format!(
            "SELECT {PRESET_COLUMNS} FROM presets ORDER BY name, id"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(presets)
    }

    pub async fn get(&self, id: i64) -> InventoryResult<Option<Preset>> {
        let preset = sqlx::query_as::<_, Preset>(&format!(
            "SELECT {PRESET_COLUMNS} FROM presets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(preset)
    }

    /// Validate `draft` and insert it.
    pub async fn create(&self, draft: PresetDraft) -> InventoryResult<Preset> {
        let preset = draft.validate()?;
        let _guard = self.gate.lock().await;

        let insert = sqlx::query_as::<_, Preset>(&format!(
            "INSERT INTO presets (name, gun_type, parameters, description, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {PRESET_COLUMNS}"
        ))
        .bind(&preset.name)
        .bind(&preset.gun_type)
        .bind(Json(&preset.parameters))
        .bind(&preset.description)
        .bind(preset.created_at)
        .fetch_one(&*self.db)
        .await?;

        info!(id = insert.id, name = %insert.name, gun_type = %insert.gun_type, "preset created");
        Ok(insert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, errors::InventoryError};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, PresetStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("presets.db").display());
        let pool = db::connect(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        (dir, PresetStore::new(Arc::new(pool), WriteGate::default()))
    }

    #[tokio::test]
    async fn create_then_get_keeps_parameters() {
        let (_dir, store) = store().await;
        let created = store
            .create(PresetDraft {
                parameters: Some(json!({ "max_pressure": 4.5, "motor_brand": "ABB" })),
                description: Some("steel line".into()),
                ..PresetDraft::new("Steel C", "spot")
            })
            .await
            .unwrap();

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.parameters.0["motor_brand"], "ABB");
        assert_eq!(fetched.description.as_deref(), Some("steel line"));
        assert!(store.get(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_database() {
        let (_dir, store) = store().await;
        let err = store.create(PresetDraft::new("", "spot")).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        let err = store
            .create(PresetDraft {
                name: Some("P1".into()),
                ..PresetDraft::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let (_dir, store) = store().await;
        for name in ["X-gun", "Aluminium", "C-gun"] {
            store.create(PresetDraft::new(name, "spot")).await.unwrap();
        }
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Aluminium", "C-gun", "X-gun"]);
        assert_eq!(store.list().await.unwrap()[0].parameters.0, json!({}));
    }
}
