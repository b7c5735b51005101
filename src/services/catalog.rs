//! Read-side view of the bundle root.
//!
//! Nothing is cached: every query rescans the directory and re-reads each
//! manifest. A folder whose manifest is missing or unreadable is skipped,
//! never fatal, so one damaged bundle cannot hide the rest.

use crate::{
    errors::{InventoryError, InventoryResult},
    models::manifest::{BundleManifest, BundleSummary, MANIFEST_FILE, ScanEntry},
};
use std::{
    cmp::Ordering,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct BundleCatalog {
    pub root: PathBuf,
}

impl BundleCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Inspect every subdirectory of the root and report what was loaded or skipped.
    ///
    /// Entries come back in directory order; a missing root yields nothing.
    pub async fn scan(&self) -> InventoryResult<Vec<ScanEntry>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => {}
                _ => continue,
            }
            entries.push(self.load(path).await);
        }
        Ok(entries)
    }

    /// All readable bundles, newest `created_at` first; undated ones last.
    pub async fn list_all(&self) -> InventoryResult<Vec<BundleSummary>> {
        let mut bundles = Vec::new();
        for entry in self.scan().await? {
            match entry {
                ScanEntry::Loaded(summary) => bundles.push(summary),
                ScanEntry::Skipped { path, reason } => {
                    warn!(folder = %path.display(), %reason, "skipping bundle");
                }
            }
        }

        bundles.sort_by(|a, b| newest_first(&a.manifest, &b.manifest));
        debug!(count = bundles.len(), "bundles listed");
        Ok(bundles)
    }

    /// First bundle (newest first) whose manifest name equals `name`.
    pub async fn get_by_name(&self, name: &str) -> InventoryResult<Option<BundleSummary>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .find(|bundle| bundle.manifest.gun.name == name))
    }

    /// Bundles made from the stored gun `id`, newest first.
    pub async fn get_by_record_id(&self, id: i64) -> InventoryResult<Vec<BundleSummary>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|bundle| bundle.manifest.gun.id == Some(id))
            .collect())
    }

    /// Remove the bundle named `name` (see [`Self::get_by_name`]) and its archive.
    pub async fn delete(&self, name: &str) -> InventoryResult<BundleSummary> {
        let bundle = self
            .get_by_name(name)
            .await?
            .ok_or_else(|| InventoryError::BundleNotFound(name.to_string()))?;

        remove_if_present(fs::remove_dir_all(&bundle.folder_path).await)?;
        remove_if_present(fs::remove_file(&bundle.archive_path).await)?;

        info!(bundle = %bundle.manifest.folder_name, "bundle deleted");
        Ok(bundle)
    }

    async fn load(&self, folder_path: PathBuf) -> ScanEntry {
        let raw = match fs::read(folder_path.join(MANIFEST_FILE)).await {
            Ok(raw) => raw,
            Err(err) => {
                return ScanEntry::Skipped {
                    path: folder_path,
                    reason: format!("manifest unreadable: {err}"),
                };
            }
        };
        let manifest: BundleManifest = match serde_json::from_slice(&raw) {
            Ok(manifest) => manifest,
            Err(err) => {
                return ScanEntry::Skipped {
                    path: folder_path,
                    reason: format!("manifest invalid: {err}"),
                };
            }
        };

        let archive_path = self.archive_path_for(&folder_path);
        let has_archive = fs::try_exists(&archive_path).await.unwrap_or(false);
        ScanEntry::Loaded(BundleSummary {
            manifest,
            folder_path,
            archive_path,
            has_archive,
        })
    }

    fn archive_path_for(&self, folder_path: &Path) -> PathBuf {
        let mut name = folder_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".zip");
        self.root.join(name)
    }
}

fn newest_first(a: &BundleManifest, b: &BundleManifest) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn remove_if_present(result: std::io::Result<()>) -> InventoryResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::manifest::{AttachmentKind, GunSnapshot},
        services::bundler::Bundler,
    };
    use tempfile::TempDir;

    fn setup() -> (TempDir, Bundler, BundleCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploaded_guns");
        (dir, Bundler::new(&root), BundleCatalog::new(&root))
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let (_dir, _bundler, catalog) = setup();
        assert!(catalog.list_all().await.unwrap().is_empty());
        assert!(catalog.get_by_name("GUN-X").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn newest_bundle_comes_first() {
        let (_dir, bundler, catalog) = setup();
        bundler.create_bundle(&GunSnapshot::named("B1")).await.unwrap();
        bundler.create_bundle(&GunSnapshot::named("B2")).await.unwrap();

        let names: Vec<_> = catalog
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.manifest.gun.name)
            .collect();
        assert_eq!(names, ["B2", "B1"]);
    }

    #[tokio::test]
    async fn damaged_folders_are_skipped_and_reported() {
        let (_dir, bundler, catalog) = setup();
        bundler.create_bundle(&GunSnapshot::named("OK")).await.unwrap();
        std::fs::create_dir_all(catalog.root.join("no_manifest")).unwrap();
        let broken = catalog.root.join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MANIFEST_FILE), "{ not json").unwrap();
        std::fs::write(catalog.root.join("stray.txt"), "ignored").unwrap();

        let scan = catalog.scan().await.unwrap();
        let skipped = scan
            .iter()
            .filter(|e| matches!(e, ScanEntry::Skipped { .. }))
            .count();
        assert_eq!(scan.len(), 3);
        assert_eq!(skipped, 2);

        let listed = catalog.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].manifest.gun.name, "OK");
    }

    #[tokio::test]
    async fn undated_manifests_sort_last() {
        let (_dir, bundler, catalog) = setup();
        bundler.create_bundle(&GunSnapshot::named("Dated")).await.unwrap();
        let legacy = catalog.root.join("Legacy_x");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(
            legacy.join(MANIFEST_FILE),
            r#"{"name": "Legacy", "folder_name": "Legacy_x"}"#,
        )
        .unwrap();

        let listed = catalog.list_all().await.unwrap();
        assert_eq!(listed.last().unwrap().manifest.gun.name, "Legacy");
    }

    #[tokio::test]
    async fn summary_tracks_archive_presence() {
        let (_dir, bundler, catalog) = setup();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();

        let before = catalog.get_by_name("G1").await.unwrap().unwrap();
        assert!(!before.has_archive);
        assert_eq!(before.folder_path, path);

        let archive = bundler.archive_bundle(&path).await.unwrap();
        let after = catalog.get_by_name("G1").await.unwrap().unwrap();
        assert!(after.has_archive);
        assert_eq!(after.archive_path, archive);
    }

    #[tokio::test]
    async fn delete_removes_folder_and_archive() {
        let (dir, bundler, catalog) = setup();
        let path = bundler.create_bundle(&GunSnapshot::named("GUN-X")).await.unwrap();
        let source = dir.path().join("a.png");
        std::fs::write(&source, "img").unwrap();
        bundler.attach_file(&path, &source, AttachmentKind::Image).await.unwrap();
        let archive = bundler.archive_bundle(&path).await.unwrap();

        catalog.delete("GUN-X").await.unwrap();

        assert!(!path.exists());
        assert!(!archive.exists());
        assert!(catalog.get_by_name("GUN-X").await.unwrap().is_none());

        let err = catalog.delete("GUN-X").await.unwrap_err();
        assert!(matches!(err, InventoryError::BundleNotFound(_)));
    }

    #[tokio::test]
    async fn bundles_resolve_by_record_id() {
        let (_dir, bundler, catalog) = setup();
        let snapshot = GunSnapshot {
            id: Some(7),
            ..GunSnapshot::named("GUN-7")
        };
        bundler.create_bundle(&snapshot).await.unwrap();
        bundler.create_bundle(&GunSnapshot::named("Other")).await.unwrap();

        let found = catalog.get_by_record_id(7).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].manifest.gun.name, "GUN-7");
        assert!(catalog.get_by_record_id(8).await.unwrap().is_empty());
    }

    fn write_bundle(catalog: &BundleCatalog, folder: &str, manifest: &str) -> PathBuf {
        let path = catalog.root.join(folder);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), manifest).unwrap();
        path
    }

    #[tokio::test]
    async fn shared_name_resolves_to_the_newest_bundle() {
        let (_dir, _bundler, catalog) = setup();
        let older = write_bundle(
            &catalog,
            "Dup_20240101_080000",
            r#"{"name": "Dup", "folder_name": "Dup_20240101_080000", "created_at": "2024-01-01T08:00:00"}"#,
        );
        let newer = write_bundle(
            &catalog,
            "Dup_20240102_080000",
            r#"{"name": "Dup", "folder_name": "Dup_20240102_080000", "created_at": "2024-01-02T08:00:00"}"#,
        );

        let found = catalog.get_by_name("Dup").await.unwrap().unwrap();
        assert_eq!(found.folder_path, newer);

        let removed = catalog.delete("Dup").await.unwrap();
        assert_eq!(removed.folder_path, newer);
        assert!(!newer.exists());
        assert!(older.exists());
        assert_eq!(catalog.get_by_name("Dup").await.unwrap().unwrap().folder_path, older);
    }

    #[tokio::test]
    async fn foreign_manifests_are_listed_with_their_extra_fields() {
        let (_dir, _bundler, catalog) = setup();
        write_bundle(
            &catalog,
            "小原_A1_20240101_120000",
            r#"{
                "name": "小原_A1",
                "status": "正常",
                "weld_type": "钢点焊",
                "gun_brand": "小原",
                "folder_name": "小原_A1_20240101_120000",
                "created_at": "2024-01-01T12:00:00"
            }"#,
        );

        let listed = catalog.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].manifest.gun.status.as_deref(), Some("正常"));

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(json["weld_type"], "钢点焊");
        assert_eq!(json["gun_brand"], "小原");
        assert_eq!(json["has_archive"], false);
    }
}
