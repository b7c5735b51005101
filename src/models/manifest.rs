//! The `gun_info.json` sidecar stored in every attachment bundle.

use crate::{errors::InventoryError, models::gun::Gun};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

/// Manifest file name inside a bundle folder.
pub const MANIFEST_FILE: &str = "gun_info.json";

/// One of the five fixed attachment categories.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentKind {
    #[serde(rename = "3d")]
    Model3d,
    #[serde(rename = "2d")]
    Drawing2d,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "signature")]
    Signature,
    #[serde(rename = "dwg")]
    Dwg,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 5] = [
        AttachmentKind::Model3d,
        AttachmentKind::Drawing2d,
        AttachmentKind::Image,
        AttachmentKind::Signature,
        AttachmentKind::Dwg,
    ];

    /// Key used in the manifest and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Model3d => "3d",
            AttachmentKind::Drawing2d => "2d",
            AttachmentKind::Image => "image",
            AttachmentKind::Signature => "signature",
            AttachmentKind::Dwg => "dwg",
        }
    }

    /// Subfolder of the bundle that holds files of this kind.
    pub fn folder(&self) -> &'static str {
        match self {
            AttachmentKind::Model3d => "3d_models",
            AttachmentKind::Drawing2d => "2d_drawings",
            AttachmentKind::Image => "images",
            AttachmentKind::Signature => "signature_drawings",
            AttachmentKind::Dwg => "dwg_files",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttachmentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InventoryError::InvalidKind(s.to_string()))
    }
}

/// Record fields copied into a bundle when it is created.
///
/// Manifests written by other tools carry extra gun parameters
/// (`weld_type`, `throat_depth`, ...). Those land in `extra` and are written
/// back untouched. `status` is kept as free text for the same reason.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GunSnapshot {
    /// Id of the stored gun this bundle was made for, if any.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub gun_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub last_maintenance: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GunSnapshot {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl From<&Gun> for GunSnapshot {
    fn from(gun: &Gun) -> Self {
        Self {
            id: Some(gun.id),
            name: gun.name.clone(),
            gun_type: gun.gun_type.clone(),
            model: gun.model.clone(),
            serial_number: gun.serial_number.clone(),
            status: Some(gun.status.to_string()),
            location: gun.location.clone(),
            last_maintenance: gun.last_maintenance.clone(),
            notes: gun.notes.clone(),
            created_by: gun.created_by.clone(),
            extra: BTreeMap::new(),
        }
    }
}

/// Durable description of a bundle and the files attached to it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BundleManifest {
    #[serde(flatten)]
    pub gun: GunSnapshot,

    pub folder_name: String,

    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,

    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,

    /// Saved file names per kind, in attach order.
    #[serde(default)]
    pub files: BTreeMap<AttachmentKind, Vec<String>>,
}

impl BundleManifest {
    /// Record `filename` under `kind`. Returns false if it was already listed.
    pub fn record_file(&mut self, kind: AttachmentKind, filename: &str) -> bool {
        let names = self.files.entry(kind).or_default();
        if names.iter().any(|existing| existing == filename) {
            return false;
        }
        names.push(filename.to_string());
        true
    }

    /// Files listed under `kind`.
    pub fn files_of(&self, kind: AttachmentKind) -> &[String] {
        self.files.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A bundle as seen by the catalog.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BundleSummary {
    #[serde(flatten)]
    pub manifest: BundleManifest,
    pub folder_path: PathBuf,
    pub archive_path: PathBuf,
    pub has_archive: bool,
}

/// Outcome of reading one directory during a catalog scan.
#[derive(Debug)]
pub enum ScanEntry {
    Loaded(BundleSummary),
    Skipped { path: PathBuf, reason: String },
}
