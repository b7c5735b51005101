//! src/services/bundler.rs
//!
//! Bundler: owns the attachment folders beneath `root`. Each bundle is a
//! directory `root/{name}_{YYYYMMDD_HHMMSS}` with one subfolder per
//! attachment kind and a `gun_info.json` manifest. Archives are written next
//! to the bundle folders as `root/{folder_name}.zip`.

use crate::{
    errors::{InventoryError, InventoryResult, join_failure},
    models::manifest::{AttachmentKind, BundleManifest, GunSnapshot, MANIFEST_FILE},
};
use chrono::Local;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

#[derive(Clone)]
pub struct Bundler {
    /// Directory holding every bundle folder and archive.
    pub root: PathBuf,

    /// One lock per bundle folder, serialising manifest read-modify-write.
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl Bundler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::default(),
        }
    }

    /// Create `root/{name}_{timestamp}` with its five subfolders and manifest.
    pub async fn create_bundle(&self, snapshot: &GunSnapshot) -> InventoryResult<PathBuf> {
        ensure_name_safe(&snapshot.name)?;
        fs::create_dir_all(&self.root).await?;

        let now = Local::now();
        let folder_name = format!("{}_{}", snapshot.name, now.format("%Y%m%d_%H%M%S"));
        let folder_path = self.root.join(&folder_name);

        match fs::create_dir(&folder_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(InventoryError::BundleAlreadyExists(folder_name));
            }
            Err(err) => return Err(err.into()),
        }

        let manifest = BundleManifest {
            gun: snapshot.clone(),
            folder_name: folder_name.clone(),
            created_at: Some(now.naive_local()),
            updated_at: None,
            files: Default::default(),
        };
        lay_out_or_discard(&folder_path, &manifest).await?;

        info!(bundle = %folder_name, "bundle created");
        Ok(folder_path)
    }

    /// Copy `source` into the `kind` subfolder of the bundle and list it in the manifest.
    ///
    /// An existing file is never replaced: the new copy is renamed to
    /// `{stem}_{HHMMSS}{.ext}`, with a counter appended if that is taken too.
    pub async fn attach_file(
        &self,
        bundle_path: &Path,
        source: &Path,
        kind: AttachmentKind,
    ) -> InventoryResult<PathBuf> {
        let key = fs::canonicalize(bundle_path)
            .await
            .unwrap_or_else(|_| bundle_path.to_path_buf());
        let lock = self.lock_for(&key).await;
        let result = {
            let _guard = lock.lock().await;
            attach_locked(bundle_path, source, kind).await
        };
        self.release(&key, lock).await;
        result
    }

    /// Write every file of the bundle into `root/{folder_name}.zip`.
    ///
    /// Entries are named relative to the bundle folder, visited in sorted
    /// order and stamped with a fixed time.
    pub async fn archive_bundle(&self, bundle_path: &Path) -> InventoryResult<PathBuf> {
        let folder_name = bundle_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                InventoryError::BundleNotFound(bundle_path.display().to_string())
            })?
            .to_string();
        if !fs::try_exists(bundle_path).await? {
            return Err(InventoryError::BundleNotFound(folder_name));
        }

        let archive_path = self.root.join(format!("{folder_name}.zip"));
        let tmp_path = self.root.join(format!(".tmp-{}.zip", Uuid::new_v4()));

        let source = bundle_path.to_path_buf();
        let tmp = tmp_path.clone();
        let written = tokio::task::spawn_blocking(move || write_zip(&source, &tmp))
            .await
            .map_err(join_failure)?;

        let entries = match written {
            Ok(entries) => entries,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&tmp_path, &archive_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        info!(bundle = %folder_name, entries, archive = %archive_path.display(), "bundle archived");
        Ok(archive_path)
    }

    async fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_path_buf()).or_default().clone()
    }

    /// Drop the table entry for `key` once nobody else holds its lock.
    async fn release(&self, key: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(key);
        }
    }
}

async fn attach_locked(
    bundle_path: &Path,
    source: &Path,
    kind: AttachmentKind,
) -> InventoryResult<PathBuf> {
    let mut manifest = read_manifest(bundle_path).await?;

    let original = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            InventoryError::validation(format!("`{}` has no file name", source.display()))
        })?;
    let target_dir = bundle_path.join(kind.folder());
    fs::create_dir_all(&target_dir).await?;

    let target = free_target(&target_dir, original).await?;
    fs::copy(source, &target).await?;

    let saved = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(original)
        .to_string();
    manifest.record_file(kind, &saved);
    manifest.updated_at = Some(Local::now().naive_local());
    write_manifest(bundle_path, &manifest).await?;

    info!(bundle = %manifest.folder_name, kind = %kind, file = %saved, "file attached");
    Ok(target)
}

/// Reject names that would escape the bundle root or break the folder name.
fn ensure_name_safe(name: &str) -> InventoryResult<()> {
    if name.trim().is_empty() {
        return Err(InventoryError::validation("bundle name is required"));
    }
    if name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\') || c.is_control())
    {
        return Err(InventoryError::validation(format!(
            "`{name}` cannot be used as a bundle folder name"
        )));
    }
    Ok(())
}

/// Create the kind subfolders and the manifest inside a fresh bundle folder.
///
/// On failure the folder is removed again, so no bundle is left without a
/// manifest.
async fn lay_out_or_discard(folder_path: &Path, manifest: &BundleManifest) -> InventoryResult<()> {
    if let Err(err) = lay_out(folder_path, manifest).await {
        if let Err(cleanup) = fs::remove_dir_all(folder_path).await {
            warn!(folder = %folder_path.display(), %cleanup, "could not remove half-built bundle");
        }
        return Err(err);
    }
    Ok(())
}

async fn lay_out(folder_path: &Path, manifest: &BundleManifest) -> InventoryResult<()> {
    for kind in AttachmentKind::ALL {
        fs::create_dir(folder_path.join(kind.folder())).await?;
    }
    write_manifest(folder_path, manifest).await
}

/// Pick a path in `dir` for `filename` that does not exist yet.
async fn free_target(dir: &Path, filename: &str) -> InventoryResult<PathBuf> {
    let candidate = dir.join(filename);
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, ext) = split_extension(filename);
    let stamp = Local::now().format("%H%M%S").to_string();
    let candidate = dir.join(format!("{stem}_{stamp}{ext}"));
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{stamp}_{n}{ext}"));
        if !fs::try_exists(&candidate).await? {
            debug!(file = %candidate.display(), "timestamped name taken, using counter");
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Split `draft.v2.pdf` into (`draft.v2`, `.pdf`). Dotfiles keep their name whole.
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => filename.split_at(pos),
        _ => (filename, ""),
    }
}

pub(crate) async fn read_manifest(bundle_path: &Path) -> InventoryResult<BundleManifest> {
    let path = bundle_path.join(MANIFEST_FILE);
    let raw = match fs::read(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(InventoryError::BundleNotFound(
                bundle_path.display().to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_slice(&raw)?)
}

/// Replace the manifest through a temporary file so readers never see a partial write.
async fn write_manifest(bundle_path: &Path, manifest: &BundleManifest) -> InventoryResult<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    let tmp_path = bundle_path.join(format!(".tmp-{}", Uuid::new_v4()));
    fs::write(&tmp_path, &json).await?;
    if let Err(err) = fs::rename(&tmp_path, bundle_path.join(MANIFEST_FILE)).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

fn write_zip(source: &Path, target: &Path) -> InventoryResult<usize> {
    let mut files = Vec::new();
    collect_files(source, source, &mut files)?;

    let mut zip = ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for (entry_name, path) in &files {
        zip.start_file(entry_name.as_str(), options)?;
        let mut input = File::open(path)?;
        io::copy(&mut input, &mut zip)?;
    }
    zip.finish()?.flush()?;
    Ok(files.len())
}

/// Gather `(entry name, absolute path)` for every file under `dir`, sorted.
fn collect_files(
    base: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> InventoryResult<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn bundler() -> (TempDir, Bundler) {
        let dir = tempfile::tempdir().unwrap();
        let bundler = Bundler::new(dir.path().join("uploaded_guns"));
        (dir, bundler)
    }

    fn source_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join("src").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn create_bundle_lays_out_subfolders_and_manifest() {
        let (_dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("GUN-X")).await.unwrap();

        let folder = path.file_name().unwrap().to_str().unwrap();
        assert!(folder.starts_with("GUN-X_"));
        assert_eq!(folder.len(), "GUN-X_".len() + "YYYYMMDD_HHMMSS".len());

        let mut dirs: Vec<_> = std::fs::read_dir(&path)
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        dirs.sort();
        assert_eq!(
            dirs,
            ["2d_drawings", "3d_models", "dwg_files", "images", "signature_drawings"]
        );

        let manifest = read_manifest(&path).await.unwrap();
        assert_eq!(manifest.gun.name, "GUN-X");
        assert_eq!(manifest.folder_name, folder);
        assert!(manifest.created_at.is_some());
    }

    #[tokio::test]
    async fn existing_folder_is_reported_not_reused() {
        let (_dir, bundler) = bundler();
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        std::fs::create_dir_all(bundler.root.join(format!("G1_{stamp}"))).unwrap();

        match bundler.create_bundle(&GunSnapshot::named("G1")).await {
            Err(InventoryError::BundleAlreadyExists(name)) => assert!(name.starts_with("G1_")),
            // The clock ticked over between the two calls.
            Ok(path) => assert_ne!(path, bundler.root.join(format!("G1_{stamp}"))),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected() {
        let (_dir, bundler) = bundler();
        for name in ["", "  ", "..", "../evil", "a/b", "a\\b", "tab\tname"] {
            let err = bundler.create_bundle(&GunSnapshot::named(name)).await.unwrap_err();
            assert!(matches!(err, InventoryError::Validation(_)), "{name}");
        }
        assert!(!bundler.root.join("evil").exists());
    }

    #[tokio::test]
    async fn dots_inside_a_name_are_fine() {
        let (_dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("GUN..1")).await.unwrap();
        assert_eq!(path.parent(), Some(bundler.root.as_path()));
        assert_eq!(read_manifest(&path).await.unwrap().gun.name, "GUN..1");
    }

    #[tokio::test]
    async fn failed_layout_removes_the_folder() {
        let (_dir, bundler) = bundler();
        let folder = bundler.root.join("G1_20240101_000000");
        std::fs::create_dir_all(&folder).unwrap();
        // A regular file where a subfolder belongs makes the layout fail.
        std::fs::write(folder.join(AttachmentKind::Image.folder()), "x").unwrap();

        let manifest = BundleManifest {
            gun: GunSnapshot::named("G1"),
            folder_name: "G1_20240101_000000".into(),
            created_at: None,
            updated_at: None,
            files: Default::default(),
        };
        let err = lay_out_or_discard(&folder, &manifest).await.unwrap_err();
        assert!(err.is_io_failure());
        assert!(!folder.exists());
    }

    #[tokio::test]
    async fn foreign_manifest_keys_survive_an_attach() {
        let (dir, bundler) = bundler();
        let path = bundler.root.join("小原_A1_20240101_120000");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join(MANIFEST_FILE),
            r#"{
                "weld_type": "钢点焊",
                "gun_brand": "小原",
                "gun_number": "A1",
                "throat_depth": "300",
                "max_pressure": "4.5",
                "motor_brand": "ABB",
                "name": "小原_A1",
                "status": "正常",
                "folder_name": "小原_A1_20240101_120000",
                "created_at": "2024-01-01T12:00:00"
            }"#,
        )
        .unwrap();
        let source = source_file(&dir, "front.jpg", "img");

        bundler.attach_file(&path, &source, AttachmentKind::Image).await.unwrap();

        let raw = std::fs::read_to_string(path.join(MANIFEST_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in ["weld_type", "gun_brand", "gun_number", "throat_depth", "max_pressure", "motor_brand"] {
            assert!(json.get(key).is_some(), "{key} dropped");
        }
        assert_eq!(json["gun_brand"], "小原");
        assert_eq!(json["status"], "正常");
        assert_eq!(json["files"]["image"][0], "front.jpg");
    }

    #[tokio::test]
    async fn lock_table_empties_after_use() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let source = source_file(&dir, "a.png", "x");

        bundler.attach_file(&path, &source, AttachmentKind::Image).await.unwrap();
        // Missing bundles go through the same lock path.
        let _ = bundler
            .attach_file(&bundler.root.join("missing"), &source, AttachmentKind::Image)
            .await;

        assert!(bundler.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn attaching_a_duplicate_name_keeps_both_files() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let first = source_file(&dir, "draft.pdf", "one");
        let second = source_file(&dir, "again/draft.pdf", "two");

        let a = bundler.attach_file(&path, &first, AttachmentKind::Drawing2d).await.unwrap();
        let b = bundler.attach_file(&path, &second, AttachmentKind::Drawing2d).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "two");
        let renamed = b.file_name().unwrap().to_str().unwrap();
        assert!(renamed.starts_with("draft_") && renamed.ends_with(".pdf"));

        let manifest = read_manifest(&path).await.unwrap();
        assert_eq!(manifest.files_of(AttachmentKind::Drawing2d).len(), 2);
        assert!(manifest.updated_at.is_some());
    }

    #[tokio::test]
    async fn third_collision_in_the_same_second_gets_a_counter() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let source = source_file(&dir, "photo.jpg", "x");

        let mut saved = Vec::new();
        for _ in 0..3 {
            saved.push(bundler.attach_file(&path, &source, AttachmentKind::Image).await.unwrap());
        }
        saved.sort();
        saved.dedup();
        assert_eq!(saved.len(), 3);
        assert_eq!(read_manifest(&path).await.unwrap().files_of(AttachmentKind::Image).len(), 3);
    }

    #[tokio::test]
    async fn attach_needs_an_existing_bundle_and_source() {
        let (dir, bundler) = bundler();
        let source = source_file(&dir, "a.dwg", "x");
        let err = bundler
            .attach_file(&bundler.root.join("missing"), &source, AttachmentKind::Dwg)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::BundleNotFound(_)));

        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let err = bundler
            .attach_file(&path, &dir.path().join("nope.dwg"), AttachmentKind::Dwg)
            .await
            .unwrap_err();
        assert!(err.is_io_failure());
        assert!(read_manifest(&path).await.unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn concurrent_attachments_all_reach_the_manifest() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let source = source_file(&dir, &format!("part{i}.step"), "solid");
            let bundler = bundler.clone();
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                bundler.attach_file(&path, &source, AttachmentKind::Model3d).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let manifest = read_manifest(&path).await.unwrap();
        assert_eq!(manifest.files_of(AttachmentKind::Model3d).len(), 8);
        assert!(bundler.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn archive_holds_relative_entries_beside_the_folder() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let source = source_file(&dir, "draft.pdf", "drawing");
        bundler.attach_file(&path, &source, AttachmentKind::Drawing2d).await.unwrap();

        let archive = bundler.archive_bundle(&path).await.unwrap();
        let folder = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(archive, bundler.root.join(format!("{folder}.zip")));

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<_> = zip.file_names().map(str::to_string).collect();
        assert!(names.contains(&"2d_drawings/draft.pdf".to_string()));
        assert!(names.contains(&MANIFEST_FILE.to_string()));

        let mut body = String::new();
        zip.by_name("2d_drawings/draft.pdf")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "drawing");
    }

    #[tokio::test]
    async fn archiving_twice_gives_identical_bytes() {
        let (dir, bundler) = bundler();
        let path = bundler.create_bundle(&GunSnapshot::named("G1")).await.unwrap();
        let source = source_file(&dir, "sig.png", "ink");
        bundler.attach_file(&path, &source, AttachmentKind::Signature).await.unwrap();

        let archive = bundler.archive_bundle(&path).await.unwrap();
        let first = std::fs::read(&archive).unwrap();
        bundler.archive_bundle(&path).await.unwrap();
        assert_eq!(first, std::fs::read(&archive).unwrap());
    }

    #[test]
    fn extension_split_keeps_inner_dots() {
        assert_eq!(split_extension("draft.v2.pdf"), ("draft.v2", ".pdf"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }
}
